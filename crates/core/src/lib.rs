//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard agent
//! orchestration runtime. This crate has **zero framework dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the LLM backend,
//! the embedder, skill sources, and the three persistence repositories.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod history;
pub mod llm;
pub mod memory;
pub mod message;
pub mod session;
pub mod skill;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ConfigError, Error, LlmError, MemoryError, Result, SkillError, TaskError};
pub use event::ExecutionEvent;
pub use history::{HistoryRepo, StoredSession};
pub use llm::{ChatOptions, ChatStream, Embedder, LlmClient, StreamChunk};
pub use memory::{MemoryRecord, MemoryRepo};
pub use message::{Attachment, ContentPart, Message, Role};
pub use session::{SessionContext, SessionMemory};
pub use skill::{SkillMetadata, SkillSource, SourceKind};
pub use task::{DagEdge, DagView, Task, TaskRepo, TaskStatus};
pub use tool::{builtin, ToolCallRequest, ToolDescriptor};
