//! Tool Channel - agent side of the JSON-RPC link to a tool host
//!
//! Information Hiding:
//! - Framing, request ids and response routing hidden behind `discover`/`call`
//! - Works over any byte stream: a child process's pipes or an in-memory duplex
//! - Host-side JSON-RPC errors mapped onto `ChannelError`
//!
//! Several calls may be in flight at once. Each registers a oneshot under its
//! request id and a single reader task routes every response to its waiter.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::protocol::{
    CallToolParams, FrameWriter, InitializeParams, InitializeResult, ListToolsResult, PeerInfo,
    RpcRequest, RpcResponse, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_NOT_FOUND,
    METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, NOT_INITIALIZED, PROTOCOL_VERSION,
};
use super::server;
use crate::config::ToolServerConfig;
use crate::errors::ChannelError;
use crate::tools::{ToolDescriptor, ToolHost, ToolResult};

type Responder = oneshot::Sender<Result<Value, ChannelError>>;

const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct PendingCalls {
    waiting: HashMap<u64, Responder>,
    /// Set once the host's output ends; no new calls are accepted after that
    closed: Option<String>,
}

struct ChannelInner {
    label: String,
    writer: FrameWriter,
    pending: Mutex<PendingCalls>,
    next_id: AtomicU64,
    ready: AtomicBool,
}

pub struct ToolChannel {
    inner: Arc<ChannelInner>,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl ToolChannel {
    /// Open a channel over an existing pair of streams. Must be followed by
    /// `initialize` before tools can be listed or called.
    pub fn connect<R, W>(reader: R, writer: W, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let inner = Arc::new(ChannelInner {
            label: label.into(),
            writer: FrameWriter::new(writer),
            pending: Mutex::new(PendingCalls::default()),
            next_id: AtomicU64::new(1),
            ready: AtomicBool::new(false),
        });

        let reader = tokio::spawn(Arc::clone(&inner).read_loop(reader));
        tracing::debug!("Tool channel '{}' opened", inner.label);

        Self {
            inner,
            reader,
            child: None,
        }
    }

    /// Launch a tool host process and talk to it over its stdin/stdout
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, ChannelError> {
        tracing::info!("Starting tool host: {} {}", command, args.join(" "));

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::transport("failed to capture tool host stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::transport("failed to capture tool host stdout"))?;

        let mut channel = Self::connect(stdout, stdin, command);
        channel.child = Some(child);
        Ok(channel)
    }

    /// Run the host on a task in this process, joined by an in-memory pipe
    pub fn in_process(host: Arc<ToolHost>) -> Self {
        let (agent_side, host_side) = tokio::io::duplex(64 * 1024);
        let (host_read, host_write) = tokio::io::split(host_side);

        tokio::spawn(async move {
            if let Err(e) = server::serve(host, host_read, host_write).await {
                tracing::warn!("In-process tool host stopped: {}", e);
            }
        });

        let (read, write) = tokio::io::split(agent_side);
        Self::connect(read, write, "in-process")
    }

    /// Initialize exchange: `initialize` request, then the `initialized`
    /// notification. Only after this do `discover` and `call` work.
    pub async fn initialize(&self) -> Result<InitializeResult, ChannelError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: PeerInfo::this_crate(),
            capabilities: json!({}),
        };
        let params =
            serde_json::to_value(params).map_err(|e| ChannelError::protocol(e.to_string()))?;

        let result = self.inner.request(METHOD_INITIALIZE, params).await?;
        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ChannelError::protocol(format!("bad initialize result: {}", e)))?;

        if info.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                "Tool host speaks protocol {}, expected {}",
                info.protocol_version,
                PROTOCOL_VERSION
            );
        }

        self.inner
            .writer
            .send(&RpcRequest::notification(METHOD_INITIALIZED, json!({})))
            .await
            .map_err(|e| ChannelError::transport(format!("failed to write to tool host: {}", e)))?;
        self.inner.ready.store(true, Ordering::SeqCst);

        tracing::info!(
            "Tool channel '{}' ready ({} {})",
            self.inner.label,
            info.server_info.name,
            info.server_info.version
        );
        Ok(info)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Descriptors in the host's registration order
    pub async fn discover(&self) -> Result<Vec<ToolDescriptor>, ChannelError> {
        self.ensure_ready()?;

        let result = self.inner.request(METHOD_TOOLS_LIST, json!({})).await?;
        let listing: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ChannelError::protocol(format!("bad tools/list result: {}", e)))?;

        tracing::debug!("Discovered {} tools", listing.tools.len());
        Ok(listing.tools)
    }

    /// Invoke a tool. A tool failure is an `Ok(ToolResult::Failure)`; `Err`
    /// means the channel itself failed.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, ChannelError> {
        self.ensure_ready()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params =
            serde_json::to_value(params).map_err(|e| ChannelError::protocol(e.to_string()))?;

        let result = self.inner.request(METHOD_TOOLS_CALL, params).await?;
        ToolResult::from_wire(&result).map_err(ChannelError::protocol)
    }

    /// Drop the write side so the host reads EOF, then give a child host a
    /// moment to exit before killing it.
    pub async fn close(mut self) {
        if let Err(e) = self.inner.writer.shutdown().await {
            tracing::debug!("Tool channel shutdown: {}", e);
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("Tool host exited: {}", status),
                _ => {
                    tracing::warn!("Tool host did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }

        tracing::debug!("Tool channel '{}' closed", self.inner.label);
    }

    fn ensure_ready(&self) -> Result<(), ChannelError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }
}

impl Drop for ToolChannel {
    fn drop(&mut self) {
        // The reader holds the writer alive; without this an in-process host
        // would never see EOF.
        self.reader.abort();
    }
}

impl ChannelInner {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if let Some(reason) = &pending.closed {
                return Err(ChannelError::transport(reason.clone()));
            }
            pending.waiting.insert(id, tx);
        }

        if let Err(e) = self.writer.send(&RpcRequest::new(id, method, params)).await {
            self.pending.lock().await.waiting.remove(&id);
            return Err(ChannelError::transport(format!(
                "failed to write to tool host: {}",
                e
            )));
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ChannelError::transport("tool channel dropped the request")),
        }
    }

    async fn read_loop<R>(self: Arc<Self>, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        let reason = loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break format!("tool host '{}' closed the channel", self.label),
                Ok(_) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match serde_json::from_slice::<Value>(&line) {
                        Ok(frame) => self.route(frame).await,
                        Err(e) => {
                            let text = String::from_utf8_lossy(&line);
                            tracing::warn!(
                                channel = %self.label,
                                line = %text.trim(),
                                "Ignoring undecodable line from tool host: {}",
                                e
                            );
                        }
                    }
                }
                Err(e) => break format!("failed to read from tool host '{}': {}", self.label, e),
            }
        };

        tracing::info!(channel = %self.label, "Tool channel input ended: {}", reason);
        self.fail_pending(reason).await;
    }

    async fn route(&self, frame: Value) {
        let method = frame.get("method").and_then(Value::as_str).map(str::to_string);

        match (method, frame.get("id").cloned()) {
            (Some(method), Some(id)) => self.answer_host_request(&method, id).await,
            (Some(method), None) => {
                tracing::debug!(channel = %self.label, "Notification from tool host: {}", method)
            }
            (None, _) => self.deliver(frame).await,
        }
    }

    async fn answer_host_request(&self, method: &str, id: Value) {
        let response = if method == METHOD_PING {
            RpcResponse::success(id, json!({}))
        } else {
            tracing::warn!(channel = %self.label, "Tool host sent unsupported request: {}", method);
            RpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("client does not implement method '{}'", method),
            )
        };

        if let Err(e) = self.writer.send(&response).await {
            tracing::warn!(channel = %self.label, "Failed to answer tool host: {}", e);
        }
    }

    async fn deliver(&self, frame: Value) {
        let response: RpcResponse = match serde_json::from_value(frame) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(channel = %self.label, "Malformed response from tool host: {}", e);
                return;
            }
        };

        let Some(id) = response.id.as_u64() else {
            // Errors for frames the host could not parse arrive with a null id
            if let Some(error) = response.error {
                tracing::warn!(
                    channel = %self.label,
                    "Tool host rejected a frame: {}",
                    error.message
                );
            }
            return;
        };

        let Some(responder) = self.pending.lock().await.waiting.remove(&id) else {
            tracing::debug!(channel = %self.label, "Response for unknown request {}", id);
            return;
        };

        let outcome = match response.error {
            Some(error) if error.code == NOT_INITIALIZED => Err(ChannelError::NotReady),
            Some(error) => Err(ChannelError::Rpc {
                code: error.code,
                message: error.message,
            }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        let _ = responder.send(outcome);
    }

    async fn fail_pending(&self, reason: String) {
        let mut pending = self.pending.lock().await;
        for (_, responder) in pending.waiting.drain() {
            let _ = responder.send(Err(ChannelError::transport(reason.clone())));
        }
        pending.closed = Some(reason);
    }
}

/// Where a conversation gets its tool channel from
#[derive(Clone)]
pub enum ChannelSource {
    /// Spawn a host process per conversation
    Process { command: String, args: Vec<String> },
    /// Serve a host on a task in this process
    InProcess(Arc<ToolHost>),
}

impl ChannelSource {
    /// The configured command, or this executable's own `serve` subcommand
    pub fn from_settings(config: &ToolServerConfig) -> Result<Self, ChannelError> {
        if let Some(command) = config.command.as_ref().filter(|c| !c.trim().is_empty()) {
            return Ok(ChannelSource::Process {
                command: command.clone(),
                args: config.args.clone(),
            });
        }

        let exe = std::env::current_exe().map_err(|source| ChannelError::Spawn {
            command: "<current executable>".to_string(),
            source,
        })?;
        Ok(ChannelSource::Process {
            command: exe.to_string_lossy().into_owned(),
            args: vec!["serve".to_string()],
        })
    }

    /// Open a fresh, not yet initialized channel
    pub fn open(&self) -> Result<ToolChannel, ChannelError> {
        match self {
            ChannelSource::Process { command, args } => ToolChannel::spawn(command, args),
            ChannelSource::InProcess(host) => Ok(ToolChannel::in_process(Arc::clone(host))),
        }
    }
}
