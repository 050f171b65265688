//! Round-based DAG executor.
//!
//! Each round lists the ready tasks, flips them to running, dispatches all
//! of them in parallel, and only after every dispatch has settled emits one
//! event per task and persists the terminal statuses. The next round may
//! include tasks freed by this round's completions; the barrier guarantees
//! no task of round n+1 starts before round n fully settles.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use switchyard_core::error::TaskError;
use switchyard_core::event::ExecutionEvent;
use switchyard_core::session::SessionContext;
use switchyard_core::task::{Task, TaskRepo, TaskStatus};
use switchyard_skills::SkillRegistry;

/// Upper bound on rounds per run; hitting it ends the run with a warning.
pub const MAX_ROUNDS: usize = 50;

/// Outcome of one executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub completed: usize,
    pub failed: usize,
    pub hit_round_limit: bool,
}

/// Executes a session's ready tasks in parallel waves.
pub struct DagExecutor {
    repo: Arc<dyn TaskRepo>,
    registry: Arc<SkillRegistry>,
}

impl DagExecutor {
    pub fn new(repo: Arc<dyn TaskRepo>, registry: Arc<SkillRegistry>) -> Self {
        Self { repo, registry }
    }

    /// The task store this executor drives.
    pub fn repo(&self) -> &Arc<dyn TaskRepo> {
        &self.repo
    }

    /// Run the session's graph, yielding events through a channel.
    pub fn execute(&self, session_id: &str) -> mpsc::Receiver<ExecutionEvent> {
        let (tx, rx) = mpsc::channel(64);
        let repo = self.repo.clone();
        let registry = self.registry.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let executor = DagExecutor { repo, registry };
            if let Err(e) = executor.run(&session_id, &tx).await {
                let _ = tx
                    .send(ExecutionEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        rx
    }

    /// Run the session's graph, sending events into an existing channel.
    ///
    /// This is how the agent loop forwards DAG events inline with its own.
    pub async fn run(
        &self,
        session_id: &str,
        tx: &mpsc::Sender<ExecutionEvent>,
    ) -> Result<RunSummary, TaskError> {
        let ctx = SessionContext::new(session_id);
        let mut summary = RunSummary::default();

        loop {
            if summary.rounds >= MAX_ROUNDS {
                warn!(session_id, rounds = summary.rounds, "DAG round limit reached");
                summary.hit_round_limit = true;
                break;
            }

            let ready = self.repo.get_ready_tasks(session_id).await?;
            if ready.is_empty() {
                break;
            }
            summary.rounds += 1;
            debug!(session_id, round = summary.rounds, tasks = ready.len(), "DAG round");

            for task in &ready {
                self.repo
                    .update_status(&task.id, TaskStatus::Running, None)
                    .await?;
            }

            let dispatches = ready
                .iter()
                .map(|task| self.dispatch(task, &ctx))
                .collect::<Vec<_>>();
            let outcomes = join_all(dispatches).await;

            // The whole round has settled; emit and persist.
            for (task, outcome) in ready.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        self.repo
                            .update_status(&task.id, TaskStatus::Completed, Some(result.clone()))
                            .await?;
                        summary.completed += 1;
                        let _ = tx
                            .send(ExecutionEvent::TaskCompleted {
                                task_id: task.id.clone(),
                                result,
                            })
                            .await;
                    }
                    Err(error) => {
                        self.repo
                            .update_status(&task.id, TaskStatus::Failed, Some(error.clone()))
                            .await?;
                        summary.failed += 1;
                        let _ = tx
                            .send(ExecutionEvent::TaskFailed {
                                task_id: task.id.clone(),
                                error,
                            })
                            .await;
                    }
                }
            }
        }

        info!(
            session_id,
            rounds = summary.rounds,
            completed = summary.completed,
            failed = summary.failed,
            "DAG run finished"
        );
        Ok(summary)
    }

    /// Dispatch one task.
    ///
    /// A description parsing as `{"tool": ..., "params": {...}}` goes
    /// through the skill registry; anything else is noted and echoed,
    /// with no side effects.
    async fn dispatch(&self, task: &Task, ctx: &SessionContext) -> Result<String, String> {
        match parse_tool_description(&task.description) {
            Some((tool, params)) => self
                .registry
                .execute_action(&tool, params, ctx)
                .await
                .map(|value| result_text(&value))
                .map_err(|e| e.to_string()),
            None => Ok(format!("Task noted: {}", task.description)),
        }
    }
}

fn parse_tool_description(description: &str) -> Option<(String, serde_json::Value)> {
    let value: serde_json::Value = serde_json::from_str(description).ok()?;
    let tool = value.get("tool")?.as_str()?.to_string();
    let params = value.get("params")?;
    if !params.is_object() {
        return None;
    }
    Some((tool, params.clone()))
}

fn result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
