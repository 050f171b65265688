//! The agent reasoning loop — think, plan, act, observe, streamed as
//! typed execution events.
//!
//! Each run: compose the system prompt (optionally augmented with
//! long-term memories), fit the conversation into the context budget,
//! advertise built-ins plus registry tools, then iterate: stream one
//! assistant turn, dispatch its tool calls (built-ins inline, everything
//! else through the registry under a hard timeout), feed observations
//! back, and stop on the first tool-free turn or the iteration cap.
//!
//! Tool-side failures never abort the loop; they surface as observations
//! the model can react to. Cancellation stops the event producer and
//! leaves no partial answer behind.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchyard_core::event::ExecutionEvent;
use switchyard_core::history::HistoryRepo;
use switchyard_core::llm::{ChatOptions, ChatStream, LlmClient, StreamChunk};
use switchyard_core::message::{Attachment, Message};
use switchyard_core::session::{SessionContext, SessionMemory};
use switchyard_core::tool::{builtin, ToolCallRequest};
use switchyard_dag::DagExecutor;
use switchyard_memory::{LongTermMemory, ShortTermMemory};
use switchyard_skills::SkillRegistry;

use crate::accumulator::ToolCallAccumulator;
use crate::builtins;
use crate::context::ContextManager;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable assistant. Use the available tools when \
     they help, and answer directly when they don't. Be accurate and concise.";

const STEP_LIMIT_NOTICE: &str = "I've reached the step limit for this request. Tell me how \
     you'd like to continue and I'll pick it up from there.";

/// How many top-ranked memories augment the system prompt.
const RECALL_LIMIT: usize = 3;

/// Per-run inputs.
#[derive(Clone)]
pub struct RunOptions {
    pub session_id: String,
    pub user_id: Option<String>,
    /// Prior conversation, oldest first.
    pub history: Vec<Message>,
    pub attachments: Vec<Attachment>,
    /// Cooperative cancellation for this run.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            history: Vec::new(),
            attachments: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The agent loop. Collaborators are injected at construction; each run
/// owns its message list, so no global mutex guards the loop itself.
#[derive(Clone)]
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    registry: Arc<SkillRegistry>,
    long_term: Option<Arc<LongTermMemory>>,
    dag: Option<Arc<DagExecutor>>,
    history: Option<Arc<dyn HistoryRepo>>,
    short_term: Option<Arc<ShortTermMemory>>,
    context: ContextManager,
    system_prompt: String,
    model: Option<String>,
    temperature: Option<f32>,
    max_iterations: u32,
    tool_timeout: Duration,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<SkillRegistry>) -> Self {
        Self {
            llm,
            registry,
            long_term: None,
            dag: None,
            history: None,
            short_term: None,
            context: ContextManager::new(8192, 1024),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            model: None,
            temperature: None,
            max_iterations: 10,
            tool_timeout: Duration::from_secs(60),
        }
    }

    /// Attach long-term memory, enabling the memory built-ins and prompt
    /// augmentation.
    pub fn with_long_term(mut self, memory: Arc<LongTermMemory>) -> Self {
        self.long_term = Some(memory);
        self
    }

    /// Attach a DAG executor, enabling the task built-ins.
    pub fn with_dag(mut self, dag: Arc<DagExecutor>) -> Self {
        self.dag = Some(dag);
        self
    }

    /// Attach a chat log; the user message and the final answer persist
    /// through it.
    pub fn with_history(mut self, history: Arc<dyn HistoryRepo>) -> Self {
        self.history = Some(history);
        self
    }

    /// Attach short-term memory; tool handlers reach it through the
    /// session context.
    pub fn with_short_term(mut self, short_term: Arc<ShortTermMemory>) -> Self {
        self.short_term = Some(short_term);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_context_budget(mut self, max_tokens: usize, reserved_tokens: usize) -> Self {
        self.context = ContextManager::new(max_tokens, reserved_tokens);
        self
    }

    /// Apply the agent and context sections of the application config.
    pub fn with_config(mut self, config: &switchyard_config::AppConfig) -> Self {
        self.model = Some(config.agent.model.clone());
        self.temperature = Some(config.agent.temperature);
        self.max_iterations = config.agent.max_iterations.max(1);
        self.tool_timeout = Duration::from_secs(config.agent.tool_timeout_secs);
        self.context = ContextManager::new(
            config.context.max_tokens,
            config.context.reserved_tokens,
        );
        self
    }

    /// Process a user message, yielding execution events lazily.
    pub fn run(&self, input: impl Into<String>, opts: RunOptions) -> mpsc::Receiver<ExecutionEvent> {
        let (tx, rx) = mpsc::channel(64);
        let agent = self.clone();
        let input = input.into();
        tokio::spawn(async move {
            agent.drive(input, opts, tx).await;
        });
        rx
    }

    async fn drive(self, input: String, opts: RunOptions, tx: mpsc::Sender<ExecutionEvent>) {
        info!(session_id = %opts.session_id, "Processing request");

        let mut ctx = SessionContext::new(&opts.session_id);
        ctx.user_id = opts.user_id.clone();
        if let Some(short_term) = &self.short_term {
            let store: Arc<dyn SessionMemory> = short_term.session(&opts.session_id).await;
            ctx.memory = Some(store);
        }

        let user_msg = Message::user_with_attachments(&input, opts.attachments.clone());
        if let Some(history_repo) = &self.history {
            if let Err(e) = history_repo.save_message(&opts.session_id, &user_msg).await {
                warn!(error = %e, "Failed to persist user message");
            }
        }

        let system = Message::system(self.compose_system_prompt(&input).await);
        let current = vec![user_msg];
        let mut messages = self
            .context
            .fit(system, &opts.history, &current, Some(self.llm.as_ref()))
            .await;

        let mut tools = builtins::descriptors(self.long_term.is_some(), self.dag.is_some());
        tools.extend(self.registry.get_tool_descriptors().await);

        let mut final_answer: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            debug!(session_id = %opts.session_id, iteration, "Agent loop iteration");

            let options = ChatOptions {
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: None,
                tools: tools.clone(),
                cancel: opts.cancel.clone(),
            };

            let stream = match self.llm.chat_stream(messages.clone(), options).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "LLM stream call failed");
                    send(&tx, ExecutionEvent::Error { message: e.to_string() }).await;
                    return;
                }
            };

            let (text, calls) = match consume_stream(stream, &opts.cancel, &tx).await {
                Ok(turn) => turn,
                Err(StreamEnd::Cancelled) => {
                    debug!(session_id = %opts.session_id, "Run cancelled mid-stream");
                    return;
                }
                Err(StreamEnd::Failed(message)) => {
                    send(&tx, ExecutionEvent::Error { message }).await;
                    return;
                }
            };

            messages.push(Message::assistant_with_tool_calls(text.clone(), calls.clone()));

            if calls.is_empty() {
                final_answer = Some(text);
                break;
            }

            // One tool reply per call id, in the order the model produced
            // the calls, before the next assistant turn.
            for call in &calls {
                if opts.cancel.is_cancelled() {
                    return;
                }
                let reply = self.handle_tool_call(call, &ctx, &tx).await;
                messages.push(Message::tool_reply(&call.id, reply));
            }
        }

        let answer = final_answer.unwrap_or_else(|| {
            warn!(
                session_id = %opts.session_id,
                max_iterations = self.max_iterations,
                "Iteration cap reached"
            );
            STEP_LIMIT_NOTICE.to_string()
        });

        send(&tx, ExecutionEvent::Answer { text: answer.clone() }).await;

        if let Some(history_repo) = &self.history {
            if let Err(e) = history_repo
                .save_message(&opts.session_id, &Message::assistant(answer))
                .await
            {
                warn!(error = %e, "Failed to persist answer");
            }
        }
    }

    /// Fixed guidance plus up to three top-ranked memories matching the
    /// input. Retrieval failures are logged and ignored.
    async fn compose_system_prompt(&self, input: &str) -> String {
        let mut prompt = self.system_prompt.clone();
        let Some(long_term) = &self.long_term else {
            return prompt;
        };

        match long_term.search(input, RECALL_LIMIT).await {
            Ok(memories) if !memories.is_empty() => {
                prompt.push_str("\n\nRelevant memories:\n");
                for memory in &memories {
                    prompt.push_str(&format!("- {}\n", memory.content));
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Memory retrieval for system prompt failed"),
        }
        prompt
    }

    /// Handle one tool call: built-ins inline, everything else through the
    /// registry. Returns the tool-reply text; events are emitted along the
    /// way. Errors become observations, never aborts.
    async fn handle_tool_call(
        &self,
        call: &ToolCallRequest,
        ctx: &SessionContext,
        tx: &mpsc::Sender<ExecutionEvent>,
    ) -> String {
        let args = call.parsed_arguments();

        match call.name.as_str() {
            builtin::PLAN_TASK => {
                let thought = args["thought"].as_str().unwrap_or_default().to_string();
                let steps: Vec<String> = args["steps"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();

                if !thought.is_empty() {
                    send(tx, ExecutionEvent::Thought { text: thought }).await;
                }
                send(tx, ExecutionEvent::Plan { steps: steps.clone() }).await;

                let steps_json = serde_json::to_string(&steps).unwrap_or_else(|_| "[]".into());
                format!("Plan acknowledged. Steps: {steps_json}. Proceed with the plan.")
            }

            builtin::MEMORY_REMEMBER => {
                let Some(long_term) = &self.long_term else {
                    return self.observe(tx, "Error: long-term memory is not configured").await;
                };
                let content = args["content"].as_str().unwrap_or_default();
                let tags: Vec<String> = args["tags"]
                    .as_str()
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();

                match long_term
                    .remember(
                        content,
                        Some(serde_json::json!({ "tags": tags })),
                        Some(&ctx.session_id),
                    )
                    .await
                {
                    Ok(id) => self.observe(tx, format!("Memory saved (id: {id})")).await,
                    Err(e) => self.observe(tx, format!("Error: {e}")).await,
                }
            }

            builtin::MEMORY_RECALL => {
                let Some(long_term) = &self.long_term else {
                    return self.observe(tx, "Error: long-term memory is not configured").await;
                };
                let query = args["query"].as_str().unwrap_or_default();
                let limit = args["limit"].as_u64().unwrap_or(5) as usize;

                match long_term.search(query, limit).await {
                    Ok(memories) if memories.is_empty() => {
                        self.observe(tx, "No relevant memories found.").await
                    }
                    Ok(memories) => {
                        let listing = memories
                            .iter()
                            .map(|m| format!("- {}", m.content))
                            .collect::<Vec<_>>()
                            .join("\n");
                        self.observe(tx, listing).await
                    }
                    Err(e) => self.observe(tx, format!("Error: {e}")).await,
                }
            }

            builtin::DAG_CREATE_TASK => {
                let Some(dag) = &self.dag else {
                    return self.observe(tx, "Error: task graph is not configured").await;
                };
                let description = args["description"].as_str().unwrap_or_default();
                let dependencies: Vec<String> = args["dependencies"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();

                match dag
                    .repo()
                    .create_task(&ctx.session_id, description, dependencies)
                    .await
                {
                    Ok(task) => {
                        send(
                            tx,
                            ExecutionEvent::TaskCreated {
                                task_id: task.id.clone(),
                                description: task.description.clone(),
                            },
                        )
                        .await;
                        format!("Task created (id: {})", task.id)
                    }
                    Err(e) => self.observe(tx, format!("Error: {e}")).await,
                }
            }

            builtin::DAG_GET_STATUS => {
                let Some(dag) = &self.dag else {
                    return self.observe(tx, "Error: task graph is not configured").await;
                };
                match dag.repo().get_dag(&ctx.session_id).await {
                    Ok(view) => {
                        let status = serde_json::json!({
                            "tasks": view.tasks.iter().map(|t| serde_json::json!({
                                "id": t.id,
                                "status": t.status.as_str(),
                                "description": t.description,
                            })).collect::<Vec<_>>(),
                            "edges": view.edges.iter().map(|e| serde_json::json!({
                                "from": e.from,
                                "to": e.to,
                            })).collect::<Vec<_>>(),
                        });
                        self.observe(tx, status.to_string()).await
                    }
                    Err(e) => self.observe(tx, format!("Error: {e}")).await,
                }
            }

            builtin::DAG_EXECUTE => {
                let Some(dag) = &self.dag else {
                    return self.observe(tx, "Error: task graph is not configured").await;
                };
                // DAG events stream inline with this run's own events.
                match dag.run(&ctx.session_id, tx).await {
                    Ok(summary) => {
                        self.observe(
                            tx,
                            format!(
                                "DAG run finished: {} completed, {} failed over {} rounds",
                                summary.completed, summary.failed, summary.rounds
                            ),
                        )
                        .await
                    }
                    Err(e) => self.observe(tx, format!("Error: {e}")).await,
                }
            }

            _ => {
                send(
                    tx,
                    ExecutionEvent::Action {
                        tool: call.name.clone(),
                        input: args.clone(),
                    },
                )
                .await;

                let dispatched = tokio::time::timeout(
                    self.tool_timeout,
                    self.registry.execute_action(&call.name, args, ctx),
                )
                .await;

                let text = match dispatched {
                    Ok(Ok(value)) => result_text(&value),
                    Ok(Err(e)) => format!("Error: {e}"),
                    Err(_) => {
                        let e = switchyard_core::error::SkillError::ToolTimeout {
                            tool_name: call.name.clone(),
                            timeout_secs: self.tool_timeout.as_secs(),
                        };
                        format!("Error: {e}")
                    }
                };
                self.observe(tx, text).await
            }
        }
    }

    /// Emit an observation and return its text as the tool reply.
    async fn observe(
        &self,
        tx: &mpsc::Sender<ExecutionEvent>,
        content: impl Into<String>,
    ) -> String {
        let content = content.into();
        send(tx, ExecutionEvent::Observation { content: content.clone() }).await;
        content
    }
}

enum StreamEnd {
    Cancelled,
    Failed(String),
}

/// Drain one assistant turn: emit `content` per delta, accumulate tool
/// calls, stop on the terminal chunk. Cancellation wins over pending
/// chunks.
async fn consume_stream(
    mut stream: ChatStream,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<ExecutionEvent>,
) -> Result<(String, Vec<ToolCallRequest>), StreamEnd> {
    let mut text = String::new();
    let mut accumulator = ToolCallAccumulator::default();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(StreamEnd::Cancelled),
            chunk = stream.recv() => chunk,
        };

        match chunk {
            None => break,
            Some(Err(e)) => return Err(StreamEnd::Failed(e.to_string())),
            Some(Ok(StreamChunk::Content { delta })) => {
                text.push_str(&delta);
                send(tx, ExecutionEvent::Content { text: delta }).await;
            }
            Some(Ok(StreamChunk::ToolCallStart { index, id, name })) => {
                accumulator.start(index, id, name);
            }
            Some(Ok(StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            })) => {
                accumulator.delta(index, id, name, &arguments);
            }
            Some(Ok(StreamChunk::ToolCallStop { index })) => {
                accumulator.stop(index);
            }
            Some(Ok(StreamChunk::Done { .. })) => break,
        }
    }

    Ok((text, accumulator.finish()))
}

fn result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

async fn send(tx: &mpsc::Sender<ExecutionEvent>, event: ExecutionEvent) {
    // A dropped receiver just means nobody is watching anymore.
    let _ = tx.send(event).await;
}
