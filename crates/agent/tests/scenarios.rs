//! End-to-end agent scenarios against a scripted LLM backend.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use switchyard_agent::{Agent, RunOptions};
use switchyard_core::error::{LlmError, SkillError};
use switchyard_core::event::ExecutionEvent;
use switchyard_core::llm::{ChatOptions, ChatStream, LlmClient, StreamChunk};
use switchyard_core::message::{Message, Role};
use switchyard_core::session::SessionContext;
use switchyard_core::skill::{SkillSource, SourceKind};
use switchyard_core::tool::ToolDescriptor;
use switchyard_dag::{DagExecutor, InMemoryTaskRepo};
use switchyard_skills::SkillRegistry;

// ── Scripted LLM ──────────────────────────────────────────────────────────

struct Turn {
    chunks: Vec<StreamChunk>,
}

impl Turn {
    fn text(parts: &[&str]) -> Self {
        let mut chunks: Vec<StreamChunk> = parts
            .iter()
            .map(|p| StreamChunk::Content { delta: p.to_string() })
            .collect();
        chunks.push(StreamChunk::Done {
            finish_reason: Some("stop".into()),
        });
        Turn { chunks }
    }

    /// An index-tagged tool-call turn, the way an OpenAI-shaped provider
    /// frames it: fragments carry the id and name on the first delta only
    /// and the finish reason flushes the call.
    fn tool_call_fragments(id: &str, name: &str, fragments: &[&str]) -> Self {
        let mut chunks = Vec::new();
        for (i, fragment) in fragments.iter().enumerate() {
            chunks.push(StreamChunk::ToolCallDelta {
                index: 0,
                id: (i == 0).then(|| id.to_string()),
                name: (i == 0).then(|| name.to_string()),
                arguments: fragment.to_string(),
            });
        }
        chunks.push(StreamChunk::Done {
            finish_reason: Some("tool_calls".into()),
        });
        Turn { chunks }
    }

    /// A block-demarcated tool-call turn, the way an Anthropic-shaped
    /// provider frames it.
    fn tool_call_block(id: &str, name: &str, arguments: &str) -> Self {
        Turn {
            chunks: vec![
                StreamChunk::ToolCallStart {
                    index: 0,
                    id: Some(id.into()),
                    name: Some(name.into()),
                },
                StreamChunk::ToolCallDelta {
                    index: 0,
                    id: None,
                    name: None,
                    arguments: arguments.into(),
                },
                StreamChunk::ToolCallStop { index: 0 },
                StreamChunk::Done {
                    finish_reason: None,
                },
            ],
        }
    }
}

struct ScriptedLlm {
    turns: Mutex<VecDeque<Turn>>,
    seen: Mutex<Vec<Vec<Message>>>,
    summary: String,
}

impl ScriptedLlm {
    fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            summary: "Summary of prior conversation".into(),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        _messages: Vec<Message>,
        _options: ChatOptions,
    ) -> Result<Message, LlmError> {
        Ok(Message::assistant(self.summary.clone()))
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        _options: ChatOptions,
    ) -> Result<ChatStream, LlmError> {
        self.seen.lock().await.push(messages);
        let turn = self.turns.lock().await.pop_front().unwrap_or(Turn {
            chunks: vec![StreamChunk::Done { finish_reason: None }],
        });

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in turn.chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

// ── Scripted skill sources ────────────────────────────────────────────────

struct FileManagerSource;

#[async_trait]
impl SkillSource for FileManagerSource {
    fn name(&self) -> &str {
        "file-manager"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn initialize(&self) -> Result<(), SkillError> {
        Ok(())
    }

    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, SkillError> {
        Ok(vec![ToolDescriptor {
            name: "file-manager.list_directory".into(),
            description: "List the entries of a directory".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        }])
    }

    async fn execute(
        &self,
        _tool_name: &str,
        _params: serde_json::Value,
        _ctx: &SessionContext,
    ) -> Result<serde_json::Value, SkillError> {
        Ok(serde_json::json!([{"name": "a.txt", "type": "file", "size": 10}]))
    }

    async fn destroy(&self) {}
}

/// A handler that never returns within its budget.
struct SleepySource;

#[async_trait]
impl SkillSource for SleepySource {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn initialize(&self) -> Result<(), SkillError> {
        Ok(())
    }

    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, SkillError> {
        Ok(vec![ToolDescriptor {
            name: "sleepy.nap".into(),
            description: "Sleeps for a very long time".into(),
            parameters: serde_json::json!({"type": "object"}),
        }])
    }

    async fn execute(
        &self,
        _tool_name: &str,
        _params: serde_json::Value,
        _ctx: &SessionContext,
    ) -> Result<serde_json::Value, SkillError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(serde_json::json!("woke up"))
    }

    async fn destroy(&self) {}
}

// ── Helpers ───────────────────────────────────────────────────────────────

async fn collect(mut rx: mpsc::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_tool_answer() {
    let llm = ScriptedLlm::new(vec![Turn::text(&["Hi", " there"])]);
    let agent = Agent::new(llm, Arc::new(SkillRegistry::new()));

    let events = collect(agent.run("Hello", RunOptions::new("s1"))).await;

    assert!(matches!(&events[0], ExecutionEvent::Content { text } if text == "Hi"));
    assert!(matches!(&events[1], ExecutionEvent::Content { text } if text == " there"));
    assert!(matches!(&events[2], ExecutionEvent::Answer { text } if text == "Hi there"));
}

#[tokio::test]
async fn single_tool_call_round_trip() {
    // The arguments arrive as split JSON fragments; the agent must
    // reassemble them before dispatch.
    let llm = ScriptedLlm::new(vec![
        Turn::tool_call_fragments(
            "call_1",
            "file-manager.list_directory",
            &[r#"{"pa"#, r#"th": "."}"#],
        ),
        Turn::text(&["Found 1 file"]),
    ]);

    let registry = Arc::new(SkillRegistry::new());
    registry
        .register_source(Arc::new(FileManagerSource))
        .await
        .unwrap();
    let agent = Agent::new(llm, registry);

    let events = collect(agent.run("list .", RunOptions::new("s1"))).await;

    match &events[0] {
        ExecutionEvent::Action { tool, input } => {
            assert_eq!(tool, "file-manager.list_directory");
            assert_eq!(input["path"], ".");
        }
        other => panic!("Expected action first, got {other:?}"),
    }
    match &events[1] {
        ExecutionEvent::Observation { content } => {
            assert!(content.contains("a.txt"));
            assert!(content.contains("\"size\":10"));
        }
        other => panic!("Expected observation, got {other:?}"),
    }
    assert!(matches!(&events[2], ExecutionEvent::Content { text } if text == "Found 1 file"));
    assert!(matches!(&events[3], ExecutionEvent::Answer { text } if text == "Found 1 file"));
}

#[tokio::test]
async fn block_framed_tool_call_round_trip() {
    let llm = ScriptedLlm::new(vec![
        Turn::tool_call_block("toolu_1", "file-manager.list_directory", r#"{"path": "."}"#),
        Turn::text(&["Found 1 file"]),
    ]);

    let registry = Arc::new(SkillRegistry::new());
    registry
        .register_source(Arc::new(FileManagerSource))
        .await
        .unwrap();
    let agent = Agent::new(llm.clone(), registry);

    let events = collect(agent.run("list .", RunOptions::new("s1"))).await;
    assert!(matches!(&events[0], ExecutionEvent::Action { .. }));
    assert!(matches!(&events[3], ExecutionEvent::Answer { text } if text == "Found 1 file"));

    // The tool reply correlates with the block's call id.
    let seen = llm.seen.lock().await;
    let reply = seen[1].last().unwrap();
    assert_eq!(reply.role, Role::Tool);
    assert_eq!(reply.tool_call_id.as_deref(), Some("toolu_1"));
}

#[tokio::test(start_paused = true)]
async fn tool_timeout_is_observed_and_loop_continues() {
    let llm = ScriptedLlm::new(vec![
        Turn::tool_call_block("call_1", "sleepy.nap", "{}"),
        Turn::text(&["The tool timed out."]),
    ]);

    let registry = Arc::new(SkillRegistry::new());
    registry.register_source(Arc::new(SleepySource)).await.unwrap();
    let agent = Agent::new(llm, registry);

    let events = collect(agent.run("take a nap", RunOptions::new("s1"))).await;

    assert!(matches!(&events[0], ExecutionEvent::Action { .. }));
    match &events[1] {
        ExecutionEvent::Observation { content } => {
            assert!(content.contains("Error:"));
            assert!(content.contains("timed out"));
            assert!(content.contains("60"));
        }
        other => panic!("Expected timeout observation, got {other:?}"),
    }
    assert!(
        matches!(&events[2], ExecutionEvent::Content { text } if text == "The tool timed out.")
    );
    assert!(
        matches!(&events[3], ExecutionEvent::Answer { text } if text == "The tool timed out.")
    );
}

#[tokio::test]
async fn context_summarization_restructures_history() {
    let llm = ScriptedLlm::new(vec![Turn::text(&["ok"])]);
    let agent = Agent::new(llm.clone(), Arc::new(SkillRegistry::new()))
        .with_context_budget(400, 40);

    let mut history = Vec::new();
    for i in 0..20 {
        history.push(Message::user(format!(
            "Question number {i} with plenty of surrounding words"
        )));
        history.push(Message::assistant(format!(
            "Answer number {i} with plenty of surrounding words"
        )));
    }

    let events = collect(agent.run(
        "current question",
        RunOptions::new("s1").with_history(history.clone()),
    ))
    .await;
    assert!(matches!(events.last().unwrap(), ExecutionEvent::Answer { .. }));

    let seen = llm.seen.lock().await;
    let messages = &seen[0];

    // [system, summary, …kept, current]
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::System);
    assert!(messages[1].content.contains("Summary of prior conversation"));
    assert!(messages.len() > 3);

    let current = messages.last().unwrap();
    assert_eq!(current.role, Role::User);
    assert_eq!(current.content, "current question");

    // The kept tail is the newest slice of history, in order.
    let kept = &messages[2..messages.len() - 1];
    let newest = &history[history.len() - kept.len()..];
    for (a, b) in kept.iter().zip(newest) {
        assert_eq!(a.id, b.id);
    }
}

#[tokio::test]
async fn dag_diamond_settles_in_three_waves() {
    let repo = Arc::new(InMemoryTaskRepo::new());
    let registry = Arc::new(SkillRegistry::new());
    let dag = Arc::new(DagExecutor::new(repo.clone(), registry.clone()));

    use switchyard_core::task::TaskRepo;
    let a = repo.create_task("s1", "A", vec![]).await.unwrap();
    let b = repo.create_task("s1", "B", vec![a.id.clone()]).await.unwrap();
    let c = repo.create_task("s1", "C", vec![a.id.clone()]).await.unwrap();
    let d = repo
        .create_task("s1", "D", vec![b.id.clone(), c.id.clone()])
        .await
        .unwrap();

    let llm = ScriptedLlm::new(vec![
        Turn::tool_call_block("call_1", "dag_execute", "{}"),
        Turn::text(&["All four tasks completed"]),
    ]);
    let agent = Agent::new(llm, registry).with_dag(dag);

    let events = collect(agent.run("run the graph", RunOptions::new("s1"))).await;

    let completed: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::TaskCompleted { task_id, .. } => Some(task_id.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(completed.len(), 4);
    assert_eq!(completed[0], a.id);
    assert!(completed[1..3].contains(&b.id));
    assert!(completed[1..3].contains(&c.id));
    assert_eq!(completed[3], d.id);

    assert!(events.iter().any(
        |e| matches!(e, ExecutionEvent::Observation { content } if content.contains("4 completed, 0 failed"))
    ));
    assert!(matches!(events.last().unwrap(), ExecutionEvent::Answer { .. }));
}
