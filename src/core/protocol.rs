//! Tool channel wire format
//!
//! Newline-delimited JSON-RPC 2.0, one object per line, the same framing MCP
//! uses for its stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::tools::ToolDescriptor;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const NOT_INITIALIZED: i64 = -32002;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params: Some(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

impl PeerInfo {
    pub fn this_crate() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: PeerInfo,
    #[serde(default)]
    pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: PeerInfo,
    #[serde(default)]
    pub capabilities: Value,
}

/// Shared line writer; each frame goes out whole under the lock
/// Newline-delimited frame sink shared by every sender on one side of a channel
///
/// `shutdown` drops the underlying writer. Some writers (a child's stdin) only
/// signal EOF to the peer when dropped.
#[derive(Clone)]
pub struct FrameWriter {
    inner: Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub async fn send<T: Serialize>(&self, frame: &T) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "frame writer closed")
        })?;
        writer.write_all(&line).await?;
        writer.flush().await
    }

    pub async fn shutdown(&self) -> std::io::Result<()> {
        match self.inner.lock().await.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_notification_has_no_id() {
        let wire = serde_json::to_value(RpcRequest::notification(METHOD_INITIALIZED, json!({})))
            .unwrap();

        assert!(wire.get("id").is_none());
        assert_eq!(wire["jsonrpc"], json!("2.0"));
    }

    #[test]
    fn test_error_response_omits_result() {
        let wire =
            serde_json::to_value(RpcResponse::error(json!(3), METHOD_NOT_FOUND, "nope")).unwrap();

        assert!(wire.get("result").is_none());
        assert_eq!(wire["error"]["code"], json!(-32601));
        assert_eq!(wire["id"], json!(3));
    }

    #[test]
    fn test_initialize_uses_camel_case() {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: PeerInfo::this_crate(),
            capabilities: json!({"tools": {}}),
        };
        let wire = serde_json::to_value(&result).unwrap();

        assert_eq!(wire["protocolVersion"], json!("2024-11-05"));
        assert_eq!(wire["serverInfo"]["name"], json!("repotools"));
    }

    #[tokio::test]
    async fn test_frame_writer_writes_one_line_per_frame() {
        let (client, server) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(client);

        writer.send(&RpcRequest::new(1, METHOD_PING, json!({}))).await.unwrap();
        writer.send(&RpcRequest::new(2, METHOD_PING, json!({}))).await.unwrap();
        writer.shutdown().await.unwrap();

        let mut lines = tokio::io::BufReader::new(server).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        let first: RpcRequest = serde_json::from_str(&first).unwrap();
        let second: RpcRequest = serde_json::from_str(&second).unwrap();

        assert_eq!(first.id, Some(json!(1)));
        assert_eq!(second.id, Some(json!(2)));
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_writer() {
        let (client, server) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(client);
        let sibling = writer.clone();

        writer.shutdown().await.unwrap();
        // a second shutdown from another handle is harmless
        sibling.shutdown().await.unwrap();

        let err = sibling.send(&RpcRequest::new(1, METHOD_PING, json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        // the duplex half was dropped, so the peer reads EOF
        let mut lines = tokio::io::BufReader::new(server).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
