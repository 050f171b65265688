//! SQLite row store for long-term memory.
//!
//! One table with unique `key` (multiple NULLs allowed) and indices on
//! `key` and `session_id`. Embeddings are persisted as JSON text so rows
//! stay inspectable with plain SQL tooling.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use switchyard_core::error::MemoryError;
use switchyard_core::memory::{MemoryRecord, MemoryRepo};

/// A SQLite-backed memory repo.
pub struct SqliteMemoryRepo {
    pool: SqlitePool,
}

impl SqliteMemoryRepo {
    /// Open (or create) the database at `path`. Pass `"sqlite::memory:"`
    /// for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let repo = Self { pool };
        repo.run_migrations().await?;
        info!("SQLite memory repo initialized at {path}");
        Ok(repo)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id         TEXT PRIMARY KEY,
                key        TEXT UNIQUE,
                content    TEXT NOT NULL,
                embedding  TEXT,
                metadata   TEXT NOT NULL DEFAULT '{}',
                session_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memories table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("session index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_updated ON memories(updated_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("updated index: {e}")))?;

        debug!("SQLite memory migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let key: Option<String> = row
            .try_get("key")
            .map_err(|e| MemoryError::QueryFailed(format!("key column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let embedding_json: Option<String> = row
            .try_get("embedding")
            .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| MemoryError::QueryFailed(format!("metadata column: {e}")))?;
        let session_id: Option<String> = row
            .try_get("session_id")
            .map_err(|e| MemoryError::QueryFailed(format!("session_id column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))?;

        let embedding = embedding_json.and_then(|j| serde_json::from_str(&j).ok());
        let metadata = serde_json::from_str(&metadata_json)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(MemoryRecord {
            id,
            key,
            content,
            embedding,
            metadata,
            session_id,
            created_at,
            updated_at,
        })
    }

    fn embedding_to_json(embedding: &Option<Vec<f32>>) -> Result<Option<String>, MemoryError> {
        embedding
            .as_ref()
            .map(|e| {
                serde_json::to_string(e)
                    .map_err(|err| MemoryError::Storage(format!("embedding serialization: {err}")))
            })
            .transpose()
    }

    /// Escape SQL LIKE wildcards in user text.
    fn escape_like(needle: &str) -> String {
        needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }
}

#[async_trait]
impl MemoryRepo for SqliteMemoryRepo {
    async fn insert(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        let embedding = Self::embedding_to_json(&record.embedding)?;
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, key, content, embedding, metadata, session_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.key)
        .bind(&record.content)
        .bind(&embedding)
        .bind(&metadata)
        .bind(&record.session_id)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        Ok(record.id)
    }

    async fn upsert_by_key(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        let key = record
            .key
            .clone()
            .ok_or_else(|| MemoryError::Storage("upsert_by_key requires a key".into()))?;
        let embedding = Self::embedding_to_json(&record.embedding)?;
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata serialization: {e}")))?;

        // The conflict branch keeps the existing row's id and created_at.
        sqlx::query(
            r#"
            INSERT INTO memories (id, key, content, embedding, metadata, session_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(key) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                metadata = excluded.metadata,
                session_id = excluded.session_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&key)
        .bind(&record.content)
        .bind(&embedding)
        .bind(&metadata)
        .bind(&record.session_id)
        .bind(record.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT failed: {e}")))?;

        let row = sqlx::query("SELECT id FROM memories WHERE key = ?1")
            .bind(&key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("id after upsert: {e}")))?;
        row.try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET by id: {e}")))?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let row = sqlx::query("SELECT * FROM memories WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET by key: {e}")))?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_embedded(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM memories WHERE embedding IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("embedded scan: {e}")))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn search_content(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let pattern = format!("%{}%", Self::escape_like(needle));
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE content LIKE ?1 ESCAPE '\'
            ORDER BY updated_at DESC
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("substring search: {e}")))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM memories WHERE session_id = ?1")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("session scan: {e}")))?;
        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteMemoryRepo {
        SqliteMemoryRepo::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = repo().await;
        let record = MemoryRecord::new("Rust is a systems programming language");
        let id = db.insert(record).await.unwrap();
        let row = db.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(row.content, "Rust is a systems programming language");
    }

    #[tokio::test]
    async fn upsert_keeps_id() {
        let db = repo().await;
        let mut first = MemoryRecord::new("v1");
        first.key = Some("prefs".into());
        let first_id = db.upsert_by_key(first).await.unwrap();

        let mut second = MemoryRecord::new("v2");
        second.key = Some("prefs".into());
        let second_id = db.upsert_by_key(second).await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(db.get_by_key("prefs").await.unwrap().unwrap().content, "v2");
    }

    #[tokio::test]
    async fn embedding_round_trip_as_json() {
        let db = repo().await;
        let mut record = MemoryRecord::new("embedded row");
        record.embedding = Some(vec![0.1, 0.2, 0.3]);
        let id = db.insert(record).await.unwrap();

        let row = db.get_by_id(&id).await.unwrap().unwrap();
        let embedding = row.embedding.unwrap();
        assert_eq!(embedding.len(), 3);
        assert!((embedding[1] - 0.2).abs() < 1e-6);

        assert_eq!(db.list_embedded().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let db = repo().await;
        let id = db.insert(MemoryRecord::new("gone")).await.unwrap();
        assert!(db.delete(&id).await.unwrap());
        assert!(!db.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn like_search_orders_by_recency() {
        let db = repo().await;
        let mut older = MemoryRecord::new("topic one");
        older.updated_at = Utc::now() - chrono::Duration::seconds(120);
        db.insert(older).await.unwrap();
        db.insert(MemoryRecord::new("topic two")).await.unwrap();
        db.insert(MemoryRecord::new("unrelated")).await.unwrap();

        let results = db.search_content("topic", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "topic two");
    }

    #[tokio::test]
    async fn like_wildcards_are_literal() {
        let db = repo().await;
        db.insert(MemoryRecord::new("contains 100% literal percent"))
            .await
            .unwrap();
        db.insert(MemoryRecord::new("no match here")).await.unwrap();

        let results = db.search_content("100%", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn multiple_keyless_rows_allowed() {
        let db = repo().await;
        db.insert(MemoryRecord::new("one")).await.unwrap();
        db.insert(MemoryRecord::new("two")).await.unwrap();
        let results = db.search_content("o", 10).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn session_index() {
        let db = repo().await;
        let mut tagged = MemoryRecord::new("session fact");
        tagged.session_id = Some("s1".into());
        db.insert(tagged).await.unwrap();
        db.insert(MemoryRecord::new("global fact")).await.unwrap();

        let rows = db.list_by_session("s1").await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
