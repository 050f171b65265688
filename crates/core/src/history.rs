//! Chat history repository trait.
//!
//! Persistence is an external collaborator; the runtime consumes this
//! interface only. The shape is the superset: session CRUD plus pin toggle
//! and title update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::Message;

/// A persisted chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Narrow interface to the persisted chat log.
#[async_trait]
pub trait HistoryRepo: Send + Sync {
    /// Append a message to a session's log. Returns the stored message id.
    async fn save_message(&self, session_id: &str, message: &Message)
        -> Result<String, MemoryError>;

    /// All messages of a session, in append order.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, MemoryError>;

    /// Create a session row. Returns the stored session.
    async fn create_session(&self, user_id: Option<&str>) -> Result<StoredSession, MemoryError>;

    async fn get_session(&self, session_id: &str)
        -> Result<Option<StoredSession>, MemoryError>;

    async fn list_sessions(&self, user_id: Option<&str>)
        -> Result<Vec<StoredSession>, MemoryError>;

    /// Delete a session and its messages; true when a row was removed.
    async fn delete_session(&self, session_id: &str) -> Result<bool, MemoryError>;

    async fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<(), MemoryError>;

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), MemoryError>;
}
