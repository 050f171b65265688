//! MCP transports: newline-delimited JSON-RPC over a child process's
//! standard I/O, and an SSE event stream with a companion POST channel.
//!
//! Both transports route responses back to callers through a pending map
//! keyed by request id; a closed connection fails every pending call.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace};

use switchyard_core::error::SkillError;

use super::rpc::{JsonRpcRequest, JsonRpcResponse};

/// Per-request budget on both transports.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the SSE endpoint event at connect time.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SkillError>>>>>;

/// A connected request/response channel to an MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SkillError>;

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SkillError>;

    /// Close the connection. Close errors are swallowed.
    async fn close(&self);
}

fn route_response(pending: &mut HashMap<u64, oneshot::Sender<Result<Value, SkillError>>>, line: &str) {
    let Ok(response) = serde_json::from_str::<JsonRpcResponse>(line) else {
        trace!(line, "Ignoring unparseable server frame");
        return;
    };
    // Frames without an id are server notifications.
    let Some(id) = response.id else {
        return;
    };
    if let Some(tx) = pending.remove(&id) {
        let outcome = match response.error {
            Some(e) => Err(SkillError::Transport(format!("[{}] {}", e.code, e.message))),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(SkillError::Transport(reason.to_string())));
    }
}

// ── Stdio ─────────────────────────────────────────────────────────────────

/// JSON-RPC over a spawned child process, one frame per line.
#[derive(Debug)]
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the configured command and start routing its stdout.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self, SkillError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SkillError::Transport(format!("spawn {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SkillError::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SkillError::Transport("child stdout unavailable".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                route_response(&mut *reader_pending.lock().await, &line);
            }
            debug!("MCP stdio stream closed");
            fail_pending(&reader_pending, "connection closed").await;
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(0),
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn write_frame(&self, request: &JsonRpcRequest) -> Result<(), SkillError> {
        let mut frame = serde_json::to_string(request)
            .map_err(|e| SkillError::Transport(format!("frame serialization: {e}")))?;
        frame.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| SkillError::Transport(format!("write: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| SkillError::Transport(format!("flush: {e}")))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SkillError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_frame(&JsonRpcRequest::request(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SkillError::Transport("connection closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SkillError::Transport(format!("request timed out: {method}")))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SkillError> {
        self.write_frame(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn close(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Err(e) = self.child.lock().await.start_kill() {
            trace!(error = %e, "Child already gone");
        }
        fail_pending(&self.pending, "transport closed").await;
    }
}

// ── SSE ───────────────────────────────────────────────────────────────────

/// JSON-RPC over a one-way SSE stream plus a companion POST channel.
///
/// The server's first `endpoint` event names the POST URL; responses come
/// back as `message` events (some servers also answer the POST directly,
/// which is honored when the body parses as a response).
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: String,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the event stream and wait for the endpoint announcement.
    pub async fn connect(url: &str) -> Result<Self, SkillError> {
        let http = reqwest::Client::new();
        let response = http
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| SkillError::Transport(format!("open event stream: {e}")))?;

        if !response.status().is_success() {
            return Err(SkillError::Transport(format!(
                "event stream returned {}",
                response.status()
            )));
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();

        let reader_pending = pending.clone();
        let reader = tokio::spawn(read_event_stream(response, reader_pending, endpoint_tx));

        let endpoint_path = tokio::time::timeout(ENDPOINT_TIMEOUT, endpoint_rx)
            .await
            .map_err(|_| SkillError::Transport("no endpoint event from server".into()))?
            .map_err(|_| SkillError::Transport("event stream closed before endpoint".into()))?;

        let endpoint = resolve_endpoint(url, &endpoint_path)?;
        debug!(endpoint = %endpoint, "MCP SSE companion channel resolved");

        Ok(Self {
            http,
            endpoint,
            pending,
            next_id: AtomicU64::new(0),
            reader: Mutex::new(Some(reader)),
        })
    }
}

/// Resolve the endpoint event's payload (absolute or relative) against the
/// stream URL.
fn resolve_endpoint(base: &str, path: &str) -> Result<String, SkillError> {
    let base = reqwest::Url::parse(base)
        .map_err(|e| SkillError::Transport(format!("invalid stream url: {e}")))?;
    let resolved = base
        .join(path)
        .map_err(|e| SkillError::Transport(format!("invalid endpoint '{path}': {e}")))?;
    Ok(resolved.to_string())
}

async fn read_event_stream(
    response: reqwest::Response,
    pending: PendingMap,
    endpoint_tx: oneshot::Sender<String>,
) {
    use futures::StreamExt;

    let mut endpoint_tx = Some(endpoint_tx);
    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut event_name = String::from("message");
    let mut data = String::new();

    'outer: while let Some(chunk) = byte_stream.next().await {
        let Ok(bytes) = chunk else {
            break 'outer;
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim_end_matches('\r').to_string();
            buffer = buffer[line_end + 1..].to_string();

            if let Some(name) = line.strip_prefix("event: ") {
                event_name = name.trim().to_string();
            } else if let Some(payload) = line.strip_prefix("data: ") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(payload.trim());
            } else if line.is_empty() {
                // Blank line terminates one event.
                if !data.is_empty() {
                    match event_name.as_str() {
                        "endpoint" => {
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(data.clone());
                            }
                        }
                        _ => route_response(&mut *pending.lock().await, &data),
                    }
                }
                data.clear();
                event_name = String::from("message");
            }
        }
    }

    debug!("MCP event stream closed");
    fail_pending(&pending, "connection closed").await;
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SkillError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::request(id, method, params);
        let posted = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SkillError::Transport(format!("companion channel: {e}"))
            });

        match posted {
            Ok(response) => {
                // Some servers answer the POST directly instead of (or as
                // well as) the stream.
                if let Ok(text) = response.text().await {
                    if let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(&text) {
                        if parsed.id == Some(id) {
                            self.pending.lock().await.remove(&id);
                            return match parsed.error {
                                Some(e) => Err(SkillError::Transport(format!(
                                    "[{}] {}",
                                    e.code, e.message
                                ))),
                                None => Ok(parsed.result.unwrap_or(Value::Null)),
                            };
                        }
                    }
                }
            }
            Err(e) => {
                self.pending.lock().await.remove(&id);
                return Err(e);
            }
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SkillError::Transport("connection closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SkillError::Transport(format!("request timed out: {method}")))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SkillError> {
        let request = JsonRpcRequest::notification(method, params);
        self.http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SkillError::Transport(format!("companion channel: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        fail_pending(&self.pending, "transport closed").await;
    }
}
