//! Memory system implementations for Switchyard.
//!
//! Short-term memory is per-session and ephemeral, bounded by LRU eviction
//! across sessions. Long-term memory persists through a row-store repo and
//! supports vector recall when an embedder is injected.

pub mod history;
pub mod in_memory;
pub mod long_term;
pub mod short_term;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use history::InMemoryHistoryRepo;
pub use in_memory::InMemoryMemoryRepo;
pub use long_term::{LongTermMemory, DEFAULT_SEARCH_LIMIT};
pub use short_term::{SessionStore, ShortTermMemory};
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMemoryRepo;
