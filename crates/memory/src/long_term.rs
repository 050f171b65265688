//! Long-term memory — content-addressable recall over a persisted row store.
//!
//! Supports keyed upsert (`set`/`get`), append-only `remember`, deletion,
//! and ranked `search`: cosine similarity over embeddings when an embedder
//! is configured, substring matching over content otherwise. Embedder
//! failures never lose data; the value is stored without an embedding and
//! a warning is logged.

use std::sync::Arc;
use tracing::{debug, warn};

use switchyard_core::error::MemoryError;
use switchyard_core::llm::Embedder;
use switchyard_core::memory::{MemoryRecord, MemoryRepo};

use crate::vector::cosine_similarity;

/// Default number of results returned by [`LongTermMemory::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// The long-term memory component.
pub struct LongTermMemory {
    repo: Arc<dyn MemoryRepo>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl LongTermMemory {
    /// Create over a row store, with vector recall disabled.
    pub fn new(repo: Arc<dyn MemoryRepo>) -> Self {
        Self {
            repo,
            embedder: None,
        }
    }

    /// Attach an embedder, enabling vector recall.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Whether vector recall is available.
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Get the decoded value stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, MemoryError> {
        let record = self.repo.get_by_key(key).await?;
        Ok(record.map(|r| decode_content(&r.content)))
    }

    /// Upsert `value` under `key`. The value is JSON-encoded for storage;
    /// an embedding is computed when an embedder is configured.
    pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), MemoryError> {
        let content = serde_json::to_string(&value)
            .map_err(|e| MemoryError::Storage(format!("value serialization: {e}")))?;

        let mut record = MemoryRecord::new(content);
        record.key = Some(key.to_string());
        record.embedding = self.try_embed(&record.content).await;

        self.repo.upsert_by_key(record).await?;
        Ok(())
    }

    /// Append a new memory with a fresh id. Returns the id.
    pub async fn remember(
        &self,
        content: &str,
        metadata: Option<serde_json::Value>,
        session_id: Option<&str>,
    ) -> Result<String, MemoryError> {
        let mut record = MemoryRecord::new(content);
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        record.session_id = session_id.map(str::to_string);
        record.embedding = self.try_embed(content).await;

        let id = self.repo.insert(record).await?;
        debug!(memory_id = %id, "Stored long-term memory");
        Ok(id)
    }

    /// Delete a memory by id; true when a row was removed.
    pub async fn forget(&self, id: &str) -> Result<bool, MemoryError> {
        self.repo.delete(id).await
    }

    /// Fetch a memory row by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        self.repo.get_by_id(id).await
    }

    /// Return up to `limit` entries ranked by relevance to `query`.
    ///
    /// With an embedder: cosine similarity over every embedded row,
    /// descending. On embedder failure, or with no embedder at all:
    /// substring match over content, most recently updated first.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if let Some(embedder) = &self.embedder {
            match embedder.embed(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let query_embedding = vectors.remove(0);
                    return self.vector_search(&query_embedding, limit).await;
                }
                Ok(_) => {
                    warn!("Embedder returned no vector for query; falling back to substring search");
                }
                Err(e) => {
                    warn!(error = %e, "Query embedding failed; falling back to substring search");
                }
            }
        }
        self.repo.search_content(query, limit).await
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = self.repo.list_embedded().await?;

        let mut scored: Vec<(f32, MemoryRecord)> = rows
            .into_iter()
            .filter_map(|record| {
                let embedding = record.embedding.as_deref()?;
                let score = cosine_similarity(embedding, query_embedding);
                Some((score, record))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[text.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => {
                warn!("Embedder returned no vector; storing without embedding");
                None
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed; storing without embedding");
                None
            }
        }
    }
}

/// Decode stored content: JSON when it parses, the raw string otherwise.
fn decode_content(content: &str) -> serde_json::Value {
    serde_json::from_str(content).unwrap_or_else(|_| serde_json::Value::String(content.into()))
}
