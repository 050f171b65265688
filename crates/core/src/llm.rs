//! LLM client trait — the abstraction over language-model backends.
//!
//! The runtime never talks to a concrete model API; it consumes this trait.
//! Implementations live outside the core (gateway adapters, test doubles).
//!
//! Streaming note: providers frame tool calls differently. One emits deltas
//! tagged with a call index (flushed on a finish reason), another demarcates
//! content blocks with start/delta/stop events. `StreamChunk` is rich enough
//! to express both; the agent's accumulator normalizes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, MemoryError};
use crate::message::Message;
use crate::tool::{ToolCallRequest, ToolDescriptor};

/// Options for a chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Model override (e.g. "claude-sonnet-4"); None uses the backend default
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    pub tools: Vec<ToolDescriptor>,

    /// Cooperative cancellation; backends stop streaming when triggered
    pub cancel: CancellationToken,
}

/// A single chunk in a streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Partial text delta.
    Content { delta: String },

    /// A tool-call block opened (block-demarcating providers).
    ToolCallStart {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// A tool-call fragment: argument text keyed by call index, with id and
    /// name possibly arriving on the first delta only (index-tagging
    /// providers).
    ToolCallDelta {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String,
    },

    /// A tool-call block closed; its arguments are complete.
    ToolCallStop { index: usize },

    /// Terminal chunk. Open tool calls must be flushed when this arrives.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

/// Receiver half of a streaming chat call.
pub type ChatStream = tokio::sync::mpsc::Receiver<Result<StreamChunk, LlmError>>;

/// The core LLM client trait.
///
/// `chat` returns a complete assistant message; `chat_stream` yields chunks.
/// The default `chat_stream` wraps `chat` in a single-shot stream, so test
/// doubles only need to implement one method.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Send a request and get a complete assistant message.
    async fn chat(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> Result<Message, LlmError>;

    /// Send a request and get a stream of response chunks.
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> Result<ChatStream, LlmError> {
        let message = self.chat(messages, options).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            if !message.content.is_empty() {
                let _ = tx
                    .send(Ok(StreamChunk::Content {
                        delta: message.content.clone(),
                    }))
                    .await;
            }
            for (index, call) in message.tool_calls.iter().enumerate() {
                let _ = tx
                    .send(Ok(StreamChunk::ToolCallStart {
                        index,
                        id: Some(call.id.clone()),
                        name: Some(call.name.clone()),
                    }))
                    .await;
                let _ = tx
                    .send(Ok(StreamChunk::ToolCallDelta {
                        index,
                        id: None,
                        name: None,
                        arguments: call.arguments.clone(),
                    }))
                    .await;
                let _ = tx.send(Ok(StreamChunk::ToolCallStop { index })).await;
            }
            let finish = if message.tool_calls.is_empty() {
                "stop"
            } else {
                "tool_calls"
            };
            let _ = tx
                .send(Ok(StreamChunk::Done {
                    finish_reason: Some(finish.into()),
                }))
                .await;
        });
        Ok(rx)
    }
}

/// An embedding function injected into the long-term memory.
///
/// Absence of an embedder disables vector recall; the memory falls back to
/// substring search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text into a vector. One vector per input, same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError>;
}

/// Convenience: build a `ToolCallRequest` from accumulated parts.
pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> ToolCallRequest {
    ToolCallRequest {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClient {
        reply: Message,
    }

    #[async_trait]
    impl LlmClient for FixedClient {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(
            &self,
            _messages: Vec<Message>,
            _options: ChatOptions,
        ) -> Result<Message, LlmError> {
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_chat() {
        let client = FixedClient {
            reply: Message::assistant_with_tool_calls(
                "Let me check",
                vec![tool_call("call_1", "files.read", r#"{"path":"a.txt"}"#)],
            ),
        };
        let mut rx = client
            .chat_stream(vec![Message::user("hi")], ChatOptions::default())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            kinds.push(match chunk {
                StreamChunk::Content { .. } => "content",
                StreamChunk::ToolCallStart { .. } => "start",
                StreamChunk::ToolCallDelta { .. } => "delta",
                StreamChunk::ToolCallStop { .. } => "stop",
                StreamChunk::Done { .. } => "done",
            });
        }
        assert_eq!(kinds, vec!["content", "start", "delta", "stop", "done"]);
    }

    #[test]
    fn chunk_serialization() {
        let chunk = StreamChunk::ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("files.read".into()),
            arguments: r#"{"pa"#.into(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"tool_call_delta""#));
    }
}
