//! In-memory row store — the test default and the backing for ephemeral
//! deployments.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use switchyard_core::error::MemoryError;
use switchyard_core::memory::{MemoryRecord, MemoryRepo};

/// A memory repo that keeps rows in a Vec behind an RwLock.
pub struct InMemoryMemoryRepo {
    rows: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryMemoryRepo {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryRepo for InMemoryMemoryRepo {
    async fn insert(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        let id = record.id.clone();
        self.rows.write().await.push(record);
        Ok(id)
    }

    async fn upsert_by_key(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        let key = record.key.clone().ok_or_else(|| {
            MemoryError::Storage("upsert_by_key requires a key".into())
        })?;

        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter_mut().find(|r| r.key.as_deref() == Some(&key)) {
            // Preserve identity and creation time of the existing row.
            record.id = existing.id.clone();
            record.created_at = existing.created_at;
            record.updated_at = Utc::now();
            *existing = record;
            Ok(existing.id.clone())
        } else {
            let id = record.id.clone();
            rows.push(record);
            Ok(id)
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| r.key.as_deref() == Some(key))
            .cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() < before)
    }

    async fn list_embedded(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.embedding.is_some())
            .cloned()
            .collect())
    }

    async fn search_content(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = self.rows.read().await;
        let mut matches: Vec<MemoryRecord> = rows
            .iter()
            .filter(|r| r.content.contains(needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect())
    }
}
