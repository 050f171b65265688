//! In-memory chat history repo.
//!
//! The production chat log lives in the host's database; this impl backs
//! tests and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use switchyard_core::error::MemoryError;
use switchyard_core::history::{HistoryRepo, StoredSession};
use switchyard_core::message::Message;

pub struct InMemoryHistoryRepo {
    sessions: RwLock<HashMap<String, StoredSession>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryHistoryRepo {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryHistoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryRepo for InMemoryHistoryRepo {
    async fn save_message(
        &self,
        session_id: &str,
        message: &Message,
    ) -> Result<String, MemoryError> {
        // Sessions come into existence on first access.
        {
            let mut sessions = self.sessions.write().await;
            sessions.entry(session_id.to_string()).or_insert_with(|| {
                let now = Utc::now();
                StoredSession {
                    id: session_id.to_string(),
                    user_id: None,
                    title: None,
                    pinned: false,
                    created_at: now,
                    updated_at: now,
                }
            });
        }

        let mut messages = self.messages.write().await;
        messages
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message.id.clone())
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(self
            .messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_session(
        &self,
        user_id: Option<&str>,
    ) -> Result<StoredSession, MemoryError> {
        let now = Utc::now();
        let session = StoredSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            title: None,
            pinned: false,
            created_at: now,
            updated_at: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<StoredSession>, MemoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<StoredSession>, MemoryError> {
        let sessions = self.sessions.read().await;
        let mut rows: Vec<StoredSession> = sessions
            .values()
            .filter(|s| user_id.is_none() || s.user_id.as_deref() == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, MemoryError> {
        self.messages.write().await.remove(session_id);
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| MemoryError::QueryFailed(format!("session not found: {session_id}")))?;
        session.pinned = pinned;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| MemoryError::QueryFailed(format!("session not found: {session_id}")))?;
        session.title = Some(title.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }
}
