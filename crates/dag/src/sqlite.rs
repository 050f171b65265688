//! SQLite task store.
//!
//! Dependencies are persisted as a JSON text column; readiness is computed
//! from the session's rows with the same rule as every other store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use switchyard_core::error::TaskError;
use switchyard_core::task::{derive_edges, DagView, Task, TaskRepo, TaskStatus};

pub struct SqliteTaskRepo {
    pool: SqlitePool,
}

impl SqliteTaskRepo {
    /// Open (or create) the database at `path`. Pass `"sqlite::memory:"`
    /// for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, TaskError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| TaskError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| TaskError::Storage(format!("Failed to open SQLite: {e}")))?;

        let repo = Self { pool };
        repo.run_migrations().await?;
        info!("SQLite task repo initialized at {path}");
        Ok(repo)
    }

    async fn run_migrations(&self) -> Result<(), TaskError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id           TEXT PRIMARY KEY,
                session_id   TEXT NOT NULL,
                description  TEXT NOT NULL,
                status       TEXT NOT NULL,
                dependencies TEXT NOT NULL DEFAULT '[]',
                result       TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Storage(format!("tasks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks(session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| TaskError::Storage(format!("session index: {e}")))?;

        debug!("SQLite task migrations complete");
        Ok(())
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, TaskError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| TaskError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| TaskError::QueryFailed(format!("session_id column: {e}")))?;
        let description: String = row
            .try_get("description")
            .map_err(|e| TaskError::QueryFailed(format!("description column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| TaskError::QueryFailed(format!("status column: {e}")))?;
        let dependencies_json: String = row
            .try_get("dependencies")
            .map_err(|e| TaskError::QueryFailed(format!("dependencies column: {e}")))?;
        let result: Option<String> = row
            .try_get("result")
            .map_err(|e| TaskError::QueryFailed(format!("result column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| TaskError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| TaskError::QueryFailed(format!("updated_at column: {e}")))?;

        let status = TaskStatus::parse(&status_str)
            .ok_or_else(|| TaskError::QueryFailed(format!("unknown status '{status_str}'")))?;
        let dependencies: Vec<String> =
            serde_json::from_str(&dependencies_json).unwrap_or_default();

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Task {
            id,
            session_id,
            description,
            status,
            dependencies,
            result,
            created_at,
            updated_at,
        })
    }

    async fn load_session(&self, session_id: &str) -> Result<Vec<Task>, TaskError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE session_id = ?1 ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TaskError::QueryFailed(format!("session scan: {e}")))?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

#[async_trait]
impl TaskRepo for SqliteTaskRepo {
    async fn create_task(
        &self,
        session_id: &str,
        description: &str,
        dependencies: Vec<String>,
    ) -> Result<Task, TaskError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            dependencies,
            result: None,
            created_at: now,
            updated_at: now,
        };

        let dependencies_json = serde_json::to_string(&task.dependencies)
            .map_err(|e| TaskError::Storage(format!("dependencies serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, session_id, description, status, dependencies, result, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)
            "#,
        )
        .bind(&task.id)
        .bind(&task.session_id)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(&dependencies_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Storage(format!("INSERT failed: {e}")))?;

        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TaskError::QueryFailed(format!("GET by id: {e}")))?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError> {
        self.load_session(session_id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
    ) -> Result<(), TaskError> {
        let outcome = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?2,
                result = COALESCE(?3, result),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&result)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Storage(format!("UPDATE failed: {e}")))?;

        if outcome.rows_affected() == 0 {
            return Err(TaskError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_ready_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError> {
        let tasks = self.load_session(session_id).await?;
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        Ok(tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.dependencies.iter().all(|dep| {
                        by_id
                            .get(dep.as_str())
                            .is_some_and(|d| d.status == TaskStatus::Completed)
                    })
            })
            .cloned()
            .collect())
    }

    async fn get_dag(&self, session_id: &str) -> Result<DagView, TaskError> {
        let tasks = self.load_session(session_id).await?;
        let edges = derive_edges(&tasks);
        Ok(DagView { tasks, edges })
    }
}
