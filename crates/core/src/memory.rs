//! Long-term memory rows and the repository trait they persist through.
//!
//! The runtime never owns the row store; it consumes this narrow interface.
//! Upsert semantics apply when a `key` is present; `remember` appends with a
//! fresh id. Two lookup paths exist: by key and by session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// A single long-term memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque unique id
    pub id: String,

    /// Optional unique key for upsert semantics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// The content: a plain string or a JSON-encoded value
    pub content: String,

    /// Optional embedding vector (persisted as JSON text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Arbitrary metadata object
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// The session that produced this memory, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a fresh record with a new id and current timestamps.
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            key: None,
            content: content.into(),
            embedding: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            session_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Row-level access to the persisted memory store.
///
/// All writes serialize through the store's transactional API; readers see
/// committed state only.
#[async_trait]
pub trait MemoryRepo: Send + Sync {
    /// Insert a record with its given id. Returns the id.
    async fn insert(&self, record: MemoryRecord) -> Result<String, MemoryError>;

    /// Insert or replace the record bearing this record's `key`.
    /// `created_at` of an existing row is preserved. Returns the row id.
    async fn upsert_by_key(&self, record: MemoryRecord) -> Result<String, MemoryError>;

    /// Fetch by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// Fetch by key.
    async fn get_by_key(&self, key: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// Delete by id; true when a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Every row that has an embedding.
    async fn list_embedded(&self) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Rows whose content contains the needle, most recently updated first.
    /// Case sensitivity follows the store's own comparison semantics.
    async fn search_content(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Rows tagged with the given session id.
    async fn list_by_session(&self, session_id: &str)
        -> Result<Vec<MemoryRecord>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_id_and_timestamps() {
        let record = MemoryRecord::new("the user prefers metric units");
        assert!(!record.id.is_empty());
        assert!(record.key.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn record_serialization_skips_empty_fields() {
        let record = MemoryRecord::new("fact");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"key\""));
        assert!(!json.contains("\"embedding\""));
        assert!(!json.contains("\"session_id\""));
    }
}
