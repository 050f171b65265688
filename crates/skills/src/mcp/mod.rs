//! Remote skill source — a supervised client for an external MCP server.
//!
//! The source registers as `mcp-<name>` and advertises the server's tools
//! as `mcp-<name>.<tool>`. Connection failures schedule reconnect attempts
//! with exponential backoff (5 s doubling, capped at 60 s) that continue
//! until the source is destroyed; a successful reconnect resets the
//! schedule. While disconnected, `get_tools` is empty and `execute` fails
//! with `NotConnected`; nothing is queued.

pub mod rpc;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchyard_config::{McpServerConfig, McpTransport as TransportKind};
use switchyard_core::error::SkillError;
use switchyard_core::session::SessionContext;
use switchyard_core::skill::{SkillSource, SourceKind};
use switchyard_core::tool::ToolDescriptor;

pub use transport::{McpTransport, SseTransport, StdioTransport};

type TransportFuture =
    futures::future::BoxFuture<'static, Result<Arc<dyn McpTransport>, SkillError>>;
type TransportFactory = Box<dyn Fn() -> TransportFuture + Send + Sync>;

/// A skill source backed by a remote MCP server.
pub struct McpSource {
    inner: Arc<Inner>,
}

struct Inner {
    config: McpServerConfig,
    source_name: String,
    factory: TransportFactory,
    transport: RwLock<Option<Arc<dyn McpTransport>>>,
    tools: RwLock<Vec<ToolDescriptor>>,
    attempts: AtomicU32,
    reconnecting: AtomicBool,
    shutdown: CancellationToken,
}

impl McpSource {
    /// Create a source for the given server entry.
    pub fn new(config: McpServerConfig) -> Self {
        let factory_config = config.clone();
        let factory: TransportFactory = Box::new(move || {
            let config = factory_config.clone();
            Box::pin(async move { build_transport(&config).await })
        });
        Self::with_factory(config, factory)
    }

    fn with_factory(config: McpServerConfig, factory: TransportFactory) -> Self {
        let source_name = format!("mcp-{}", config.name);
        Self {
            inner: Arc::new(Inner {
                config,
                source_name,
                factory,
                transport: RwLock::new(None),
                tools: RwLock::new(Vec::new()),
                attempts: AtomicU32::new(0),
                reconnecting: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Whether the source currently holds a live connection.
    pub async fn is_connected(&self) -> bool {
        self.inner.transport.read().await.is_some()
    }
}

async fn build_transport(config: &McpServerConfig) -> Result<Arc<dyn McpTransport>, SkillError> {
    match config.transport {
        TransportKind::Stdio => {
            // validate() has run by now, so command is present.
            let command = config.command.as_deref().unwrap_or_default();
            Ok(Arc::new(StdioTransport::spawn(command, &config.args).await?))
        }
        TransportKind::Sse => {
            let url = config.url.as_deref().unwrap_or_default();
            Ok(Arc::new(SseTransport::connect(url).await?))
        }
    }
}

/// Backoff for reconnect attempt `n` (1-based): min(5000 × 2^(n−1), 60000) ms.
fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(4);
    Duration::from_millis((5000u64 << exp).min(60_000))
}

fn schedule_reconnect(inner: &Arc<Inner>) {
    if inner.shutdown.is_cancelled() {
        return;
    }
    if inner.reconnecting.swap(true, Ordering::SeqCst) {
        return;
    }

    let inner = inner.clone();
    tokio::spawn(async move {
        loop {
            let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = reconnect_delay(attempt);
            debug!(
                source = %inner.source_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if inner.shutdown.is_cancelled() {
                break;
            }

            match inner.connect().await {
                Ok(()) => break,
                Err(e) => {
                    warn!(source = %inner.source_name, attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }
        inner.reconnecting.store(false, Ordering::SeqCst);
    });
}

impl Inner {
    async fn connect(&self) -> Result<(), SkillError> {
        self.config.validate()?;

        let transport = (self.factory)().await?;
        match self.handshake(&transport).await {
            Ok(tools) => {
                *self.transport.write().await = Some(transport);
                let count = tools.len();
                *self.tools.write().await = tools;
                self.attempts.store(0, Ordering::SeqCst);
                info!(source = %self.source_name, tools = count, "MCP source connected");
                Ok(())
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        transport: &Arc<dyn McpTransport>,
    ) -> Result<Vec<ToolDescriptor>, SkillError> {
        transport
            .request("initialize", Some(rpc::initialize_params()))
            .await?;
        transport.notify("notifications/initialized", None).await?;

        let listed = transport.request("tools/list", None).await?;
        let listed: rpc::ListToolsResult = serde_json::from_value(listed)
            .map_err(|e| SkillError::Transport(format!("tools/list payload: {e}")))?;

        Ok(listed
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: format!("{}.{}", self.source_name, tool.name),
                description: tool.description.unwrap_or_default(),
                parameters: tool
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
            .collect())
    }

    async fn disconnect(&self) {
        if let Some(transport) = self.transport.write().await.take() {
            transport.close().await;
        }
        self.tools.write().await.clear();
    }
}

/// Apply the text-block extraction rules to a `tools/call` result.
///
/// Exactly one text block yields its text; several are joined with
/// newlines; none yields the raw response. A server-flagged error becomes
/// a tool execution failure.
fn extract_call_result(tool_name: &str, raw: Value) -> Result<Value, SkillError> {
    let Ok(parsed) = serde_json::from_value::<rpc::CallToolResult>(raw.clone()) else {
        return Ok(raw);
    };

    let texts: Vec<&str> = parsed
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text.as_deref())
        .collect();

    if parsed.is_error == Some(true) {
        let reason = if texts.is_empty() {
            raw.to_string()
        } else {
            texts.join("\n")
        };
        return Err(SkillError::execution(tool_name, reason));
    }

    match texts.len() {
        0 => Ok(raw),
        1 => Ok(Value::String(texts[0].to_string())),
        _ => Ok(Value::String(texts.join("\n"))),
    }
}

#[async_trait]
impl SkillSource for McpSource {
    fn name(&self) -> &str {
        &self.inner.source_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn initialize(&self) -> Result<(), SkillError> {
        match self.inner.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(source = %self.inner.source_name, error = %e, "Initial connection failed");
                schedule_reconnect(&self.inner);
                Err(e)
            }
        }
    }

    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, SkillError> {
        Ok(self.inner.tools.read().await.clone())
    }

    async fn execute(
        &self,
        tool_name: &str,
        params: Value,
        _ctx: &SessionContext,
    ) -> Result<Value, SkillError> {
        let transport = self
            .inner
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| SkillError::NotConnected(self.inner.source_name.clone()))?;

        let prefix = format!("{}.", self.inner.source_name);
        let bare_name = tool_name.strip_prefix(&prefix).unwrap_or(tool_name);

        let result = transport
            .request(
                "tools/call",
                Some(serde_json::json!({
                    "name": bare_name,
                    "arguments": params,
                })),
            )
            .await;

        match result {
            Ok(raw) => extract_call_result(tool_name, raw),
            Err(e) => {
                // Connection is gone; future calls fail fast while the
                // supervisor re-establishes it.
                warn!(source = %self.inner.source_name, error = %e, "Call failed; reconnecting");
                self.inner.disconnect().await;
                schedule_reconnect(&self.inner);
                Err(e)
            }
        }
    }

    async fn destroy(&self) {
        self.inner.shutdown.cancel();
        self.inner.disconnect().await;
        debug!(source = %self.inner.source_name, "MCP source destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    fn stdio_config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some("unused-in-tests".into()),
            args: vec![],
            url: None,
            enabled: true,
        }
    }

    /// A scripted in-process server.
    struct ScriptedTransport {
        tools: Vec<Value>,
        call_result: Value,
        calls: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn new(tools: Vec<Value>, call_result: Value) -> Self {
            Self {
                tools,
                call_result,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SkillError> {
            match method {
                "initialize" => Ok(serde_json::json!({"protocolVersion": rpc::PROTOCOL_VERSION})),
                "tools/list" => Ok(serde_json::json!({"tools": self.tools})),
                "tools/call" => {
                    self.calls.lock().await.push(params.unwrap_or(Value::Null));
                    Ok(self.call_result.clone())
                }
                other => Err(SkillError::Transport(format!("unexpected method {other}"))),
            }
        }

        async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<(), SkillError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn scripted_source(
        name: &str,
        transport: Arc<ScriptedTransport>,
    ) -> McpSource {
        let factory: TransportFactory = Box::new(move || {
            let transport = transport.clone();
            Box::pin(async move { Ok(transport as Arc<dyn McpTransport>) })
        });
        McpSource::with_factory(stdio_config(name), factory)
    }

    fn list_tool() -> Value {
        serde_json::json!({
            "name": "list_directory",
            "description": "List a directory",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        })
    }

    #[tokio::test]
    async fn tools_are_prefixed() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![list_tool()],
            serde_json::json!({"content": []}),
        ));
        let source = scripted_source("files", transport);
        source.initialize().await.unwrap();

        assert_eq!(source.name(), "mcp-files");
        let tools = source.get_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "mcp-files.list_directory");
        assert_eq!(tools[0].description, "List a directory");
    }

    #[tokio::test]
    async fn execute_strips_prefix_before_forwarding() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![list_tool()],
            serde_json::json!({"content": [{"type": "text", "text": "[]"}]}),
        ));
        let calls = transport.calls.clone();
        let source = scripted_source("files", transport);
        source.initialize().await.unwrap();

        let ctx = SessionContext::new("s1");
        let result = source
            .execute(
                "mcp-files.list_directory",
                serde_json::json!({"path": "."}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result, Value::String("[]".into()));

        let recorded = calls.lock().await;
        assert_eq!(recorded[0]["name"], "list_directory");
        assert_eq!(recorded[0]["arguments"]["path"], ".");
    }

    #[tokio::test]
    async fn disconnected_source_fails_fast() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Value::Null));
        let source = scripted_source("files", transport);
        // Never initialized: no tools, no execution, no queueing.
        assert!(source.get_tools().await.unwrap().is_empty());

        let ctx = SessionContext::new("s1");
        let err = source
            .execute("mcp-files.list_directory", serde_json::json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::NotConnected(_)));
    }

    #[test]
    fn extraction_rules() {
        // One text block: its text.
        let one = serde_json::json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(
            extract_call_result("t", one).unwrap(),
            Value::String("hello".into())
        );

        // Several: joined with newlines.
        let many = serde_json::json!({"content": [
            {"type": "text", "text": "a"},
            {"type": "image", "data": "zzz"},
            {"type": "text", "text": "b"}
        ]});
        assert_eq!(
            extract_call_result("t", many).unwrap(),
            Value::String("a\nb".into())
        );

        // None: the raw response.
        let raw = serde_json::json!({"content": [{"type": "image", "data": "zzz"}]});
        assert_eq!(extract_call_result("t", raw.clone()).unwrap(), raw);

        // Server-flagged error.
        let err = serde_json::json!({"content": [{"type": "text", "text": "nope"}], "isError": true});
        let e = extract_call_result("t", err).unwrap_err();
        assert!(e.to_string().contains("nope"));
    }

    #[test]
    fn backoff_schedule() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(5000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(10000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(20000));
        assert_eq!(reconnect_delay(4), Duration::from_millis(40000));
        assert_eq!(reconnect_delay(5), Duration::from_millis(60000));
        assert_eq!(reconnect_delay(12), Duration::from_millis(60000));
    }

    /// Factory that fails a fixed number of times, recording attempt times.
    fn flaky_factory(
        failures: u32,
        transport: Arc<ScriptedTransport>,
        attempts: Arc<Mutex<Vec<tokio::time::Instant>>>,
    ) -> TransportFactory {
        let count = Arc::new(AtomicU32::new(0));
        Box::new(move || {
            let transport = transport.clone();
            let attempts = attempts.clone();
            let count = count.clone();
            Box::pin(async move {
                attempts.lock().await.push(tokio::time::Instant::now());
                if count.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(SkillError::Transport("server not up yet".into()))
                } else {
                    Ok(transport as Arc<dyn McpTransport>)
                }
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_exponential_backoff() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![list_tool()],
            serde_json::json!({"content": []}),
        ));
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let source = McpSource::with_factory(
            stdio_config("files"),
            flaky_factory(2, transport, attempts.clone()),
        );

        // First attempt fails and schedules the supervisor.
        assert!(source.initialize().await.is_err());

        // Let the paused clock run the 5 s and 10 s retries.
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(source.is_connected().await);
        let tools = source.get_tools().await.unwrap();
        assert_eq!(tools[0].name, "mcp-files.list_directory");

        let recorded = attempts.lock().await;
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[1] - recorded[0], Duration::from_secs(5));
        assert_eq!(recorded[2] - recorded[1], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_cancels_reconnect() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Value::Null));
        let attempts = Arc::new(Mutex::new(Vec::new()));
        // Never succeeds.
        let source = McpSource::with_factory(
            stdio_config("files"),
            flaky_factory(u32::MAX, transport, attempts.clone()),
        );

        assert!(source.initialize().await.is_err());
        tokio::time::sleep(Duration::from_secs(6)).await;
        source.destroy().await;

        let frozen = attempts.lock().await.len();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(attempts.lock().await.len(), frozen);
    }

    #[tokio::test]
    async fn successful_reconnect_resets_attempts() {
        let transport = Arc::new(ScriptedTransport::new(vec![], serde_json::json!({})));
        let source = scripted_source("files", transport);
        source.inner.attempts.store(7, Ordering::SeqCst);
        source.initialize().await.unwrap();
        assert_eq!(source.inner.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_config_fails_at_initialize() {
        let mut config = stdio_config("broken");
        config.command = None;
        let source = McpSource::new(config);
        let err = source.initialize().await.unwrap_err();
        assert!(err.to_string().contains("command"));
        source.destroy().await;
    }
}
