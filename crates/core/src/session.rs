//! Session handle passed to skill handlers.
//!
//! Components reference each other by id strings, not object pointers; the
//! session context carries the ids plus a handle to the session's
//! short-term memory when one exists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Key/value access to a session's short-term memory.
///
/// Implemented by the short-term memory crate; handlers receive it through
/// the [`SessionContext`] so they never hold the manager itself.
#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// Get a value; `None` on missing or expired.
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Unconditionally write a value, with an optional time-to-live.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>);

    /// Drop every value in this session.
    async fn clear(&self);
}

/// The per-request session handle.
#[derive(Clone)]
pub struct SessionContext {
    /// The session this request belongs to
    pub session_id: String,

    /// The user driving the session, when known
    pub user_id: Option<String>,

    /// Short-term memory scoped to this session
    pub memory: Option<Arc<dyn SessionMemory>>,
}

impl SessionContext {
    /// Create a context with no memory handle.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            memory: None,
        }
    }

    /// Attach a user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a short-term memory handle.
    pub fn with_memory(mut self, memory: Arc<dyn SessionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("memory", &self.memory.is_some())
            .finish()
    }
}
