//! Execution events emitted by the agent loop and the DAG executor.
//!
//! Every run produces a lazy sequence of these events. Each variant
//! serializes as a flat JSON object with a `type` tag, so a gateway can
//! forward them to clients over SSE or WebSocket unchanged.

use serde::{Deserialize, Serialize};

/// Events emitted during an agent run.
///
/// - `content`      — incremental text from the LLM
/// - `thought`      — rationale from a planning call
/// - `plan`         — ordered list of steps
/// - `action`       — a tool invocation begins
/// - `observation`  — a tool result or error
/// - `task_created` / `task_completed` / `task_failed` — DAG lifecycle
/// - `answer`       — final text
/// - `error`        — the run ended abnormally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Partial text token from the LLM.
    Content { text: String },

    /// A reasoning step surfaced by the planning built-in.
    Thought { text: String },

    /// An ordered plan of steps.
    Plan { steps: Vec<String> },

    /// The agent is invoking a tool.
    Action {
        tool: String,
        input: serde_json::Value,
    },

    /// A tool result or a human-readable tool error.
    Observation { content: String },

    /// A task was persisted into the task graph.
    TaskCreated { task_id: String, description: String },

    /// A task settled successfully.
    TaskCompleted { task_id: String, result: String },

    /// A task settled with an error.
    TaskFailed { task_id: String, error: String },

    /// The final answer for this run.
    Answer { text: String },

    /// An error ended the run.
    Error { message: String },
}

impl ExecutionEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Thought { .. } => "thought",
            Self::Plan { .. } => "plan",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::Answer { .. } => "answer",
            Self::Error { .. } => "error",
        }
    }
}
