//! In-memory task store.
//!
//! The production task log lives in the host's database; this impl backs
//! tests and single-process deployments. Readiness is computed the same
//! way everywhere: pending, with every dependency completed.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use switchyard_core::error::TaskError;
use switchyard_core::task::{derive_edges, DagView, Task, TaskRepo, TaskStatus};

pub struct InMemoryTaskRepo {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepo {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn session_tasks(tasks: &HashMap<String, Task>, session_id: &str) -> Vec<Task> {
    let mut rows: Vec<Task> = tasks
        .values()
        .filter(|t| t.session_id == session_id)
        .cloned()
        .collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}

fn is_ready(task: &Task, tasks: &HashMap<String, Task>) -> bool {
    task.status == TaskStatus::Pending
        && task.dependencies.iter().all(|dep| {
            tasks
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
}

#[async_trait]
impl TaskRepo for InMemoryTaskRepo {
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
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn get_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError> {
        Ok(session_tasks(&*self.tasks.read().await, session_id))
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
    ) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn get_ready_tasks(&self, session_id: &str) -> Result<Vec<Task>, TaskError> {
        let tasks = self.tasks.read().await;
        Ok(session_tasks(&tasks, session_id)
            .into_iter()
            .filter(|t| is_ready(t, &tasks))
            .collect())
    }

    async fn get_dag(&self, session_id: &str) -> Result<DagView, TaskError> {
        let tasks = session_tasks(&*self.tasks.read().await, session_id);
        let edges = derive_edges(&tasks);
        Ok(DagView { tasks, edges })
    }
}
