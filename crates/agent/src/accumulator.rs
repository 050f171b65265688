//! Tool-call accumulation over streaming chunks.
//!
//! Providers frame tool calls two ways: index-tagged argument deltas
//! flushed by a finish reason, or explicit block start/delta/stop events.
//! The accumulator normalizes both: fragments for the same slot are
//! concatenated, a stop flushes that slot, and `finish` flushes whatever
//! is still open in index order.

use std::collections::BTreeMap;

use switchyard_core::tool::ToolCallRequest;

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialCall {
    fn into_request(self, index: usize) -> ToolCallRequest {
        ToolCallRequest {
            // Providers that never send an id get a synthetic one so tool
            // replies can still be correlated.
            id: self.id.unwrap_or_else(|| format!("call_{index}")),
            name: self.name.unwrap_or_default(),
            arguments: self.arguments,
        }
    }
}

/// Accumulates partial tool calls keyed by the provider's call index.
#[derive(Default)]
pub struct ToolCallAccumulator {
    open: BTreeMap<usize, PartialCall>,
    completed: Vec<ToolCallRequest>,
}

impl ToolCallAccumulator {
    /// A block-demarcating provider opened a call.
    pub fn start(&mut self, index: usize, id: Option<String>, name: Option<String>) {
        // A reused index means the previous block never got its stop.
        if let Some(stale) = self.open.remove(&index) {
            self.completed.push(stale.into_request(index));
        }
        self.open.insert(
            index,
            PartialCall {
                id,
                name,
                arguments: String::new(),
            },
        );
    }

    /// An argument fragment arrived; id and name may ride along on the
    /// first delta only.
    pub fn delta(
        &mut self,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: &str,
    ) {
        let slot = self.open.entry(index).or_default();
        if slot.id.is_none() {
            slot.id = id;
        }
        if slot.name.is_none() {
            slot.name = name;
        }
        slot.arguments.push_str(arguments);
    }

    /// A block closed; its arguments are complete.
    pub fn stop(&mut self, index: usize) {
        if let Some(call) = self.open.remove(&index) {
            self.completed.push(call.into_request(index));
        }
    }

    /// Terminal signal: flush everything still open, in index order, and
    /// return the completed calls in emission order.
    pub fn finish(mut self) -> Vec<ToolCallRequest> {
        let open = std::mem::take(&mut self.open);
        for (index, call) in open {
            self.completed.push(call.into_request(index));
        }
        self.completed
    }
}
