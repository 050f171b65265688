//! Task graph domain types and the task repository trait.
//!
//! Tasks outlive a single request: they are persisted so a later request
//! can inspect or advance them. Edges are explicit dependency ids; a task
//! is ready when it is pending and every dependency has completed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Lifecycle state of a task.
///
/// Transitions only pending → running → {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A unit of work in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    /// The session that owns this task; dependencies reference tasks in the
    /// same session.
    pub session_id: String,

    /// Free-form text, or a JSON object `{"tool": ..., "params": ...}`
    /// dispatched through the skill registry.
    pub description: String,

    pub status: TaskStatus,

    /// Ids of tasks that must complete before this one becomes ready
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Result text once the task settles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A derived dependency edge: `from` must complete before `to` may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
}

/// A session's tasks plus the derived edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagView {
    pub tasks: Vec<Task>,
    pub edges: Vec<DagEdge>,
}

/// Narrow interface to the persisted task store.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Persist a new pending task. Returns the stored task.
    async fn create_task(
        &self,
        session_id: &str,
        description: &str,
        dependencies: Vec<String>,
    ) -> Result<Task, TaskError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskError>;

    async fn get_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError>;

    /// Update status and, for terminal states, the result text.
    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
    ) -> Result<(), TaskError>;

    /// Tasks that are pending with every dependency completed.
    async fn get_ready_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError>;

    /// The session's tasks plus derived `{from, to}` edges.
    async fn get_dag(&self, session_id: &str) -> Result<DagView, TaskError>;
}

/// Derive the edge list for a set of tasks.
pub fn derive_edges(tasks: &[Task]) -> Vec<DagEdge> {
    tasks
        .iter()
        .flat_map(|task| {
            task.dependencies.iter().map(|dep| DagEdge {
                from: dep.clone(),
                to: task.id.clone(),
            })
        })
        .collect()
}
