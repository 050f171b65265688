//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level `Error`
//! aggregates them with `#[from]` conversions.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Skill errors ---
    #[error("Skill error: {0}")]
    Skill(#[from] SkillError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Task errors ---
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    // --- Configuration errors ---
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cooperative cancellation; the event producer stops emitting.
    #[error("Run cancelled")]
    Cancelled,

    /// A bug. Terminates the run, logged at error level.
    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Configuration problems. Fatal to the affected component only.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required field `{field}` for {context}")]
    MissingField { context: String, field: String },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Errors raised by skill sources and the registry.
#[derive(Debug, Error)]
pub enum SkillError {
    /// Remote source unavailable; the source self-heals via reconnection.
    #[error("Source not connected: {0}")]
    NotConnected(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    ToolTimeout { tool_name: String, timeout_secs: u64 },

    /// Wraps any error raised by a tool handler.
    #[error("Tool execution failed: {tool_name}: {reason}")]
    Execution { tool_name: String, reason: String },

    /// Transport or protocol failure while talking to a remote server.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Manifest parse error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SkillError {
    /// Wrap an arbitrary handler error for the given tool.
    pub fn execution(tool_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Execution {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors from an LLM backend.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from memory stores.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors from the task store and DAG executor.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
