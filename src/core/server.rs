//! Tool host side of the channel
//!
//! Reads one JSON-RPC frame per line, answers on the shared writer. Every
//! `tools/call` runs on its own task so a slow tool never holds up the rest;
//! responses may therefore leave in a different order than requests arrived,
//! and the caller correlates them by id.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinSet;

use super::protocol::{
    CallToolParams, FrameWriter, InitializeResult, ListToolsResult, PeerInfo, RpcRequest,
    RpcResponse, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_NOT_FOUND, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    NOT_INITIALIZED, PARSE_ERROR, PROTOCOL_VERSION,
};
use crate::tools::ToolHost;

/// Serve the host until the reader reaches EOF
pub async fn serve<R, W>(host: Arc<ToolHost>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let writer = FrameWriter::new(writer);
    let initialized = AtomicBool::new(false);
    let mut calls = JoinSet::new();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    tracing::info!("Tool host serving {} tools", host.tool_names().len());

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        // Reap finished calls so the set does not grow for the whole session
        while calls.try_join_next().is_some() {}

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(response) => {
                writer.send(&response).await?;
                continue;
            }
        };

        let Some(id) = request.id.clone() else {
            handle_notification(&request, &initialized);
            continue;
        };

        match request.method.as_str() {
            METHOD_INITIALIZE => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_info: PeerInfo::this_crate(),
                    capabilities: json!({ "tools": {} }),
                };
                initialized.store(true, Ordering::SeqCst);
                writer
                    .send(&RpcResponse::success(id, serde_json::to_value(result)?))
                    .await?;
            }
            METHOD_PING => {
                writer.send(&RpcResponse::success(id, json!({}))).await?;
            }
            METHOD_TOOLS_LIST | METHOD_TOOLS_CALL if !initialized.load(Ordering::SeqCst) => {
                writer
                    .send(&RpcResponse::error(
                        id,
                        NOT_INITIALIZED,
                        "host not initialized; send initialize first",
                    ))
                    .await?;
            }
            METHOD_TOOLS_LIST => {
                let result = ListToolsResult {
                    tools: host.list_tools(),
                };
                writer
                    .send(&RpcResponse::success(id, serde_json::to_value(result)?))
                    .await?;
            }
            METHOD_TOOLS_CALL => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            writer
                                .send(&RpcResponse::error(
                                    id,
                                    INVALID_PARAMS,
                                    format!("invalid tools/call params: {}", e),
                                ))
                                .await?;
                            continue;
                        }
                    };

                let host = Arc::clone(&host);
                let writer = writer.clone();
                calls.spawn(async move {
                    let result = host.invoke(&params.name, params.arguments).await;
                    let response = RpcResponse::success(id, result.to_wire());
                    if let Err(e) = writer.send(&response).await {
                        tracing::warn!("Failed to write tools/call response: {}", e);
                    }
                });
            }
            other => {
                tracing::debug!("Unsupported method: {}", other);
                writer
                    .send(&RpcResponse::error(
                        id,
                        METHOD_NOT_FOUND,
                        format!("method '{}' not found", other),
                    ))
                    .await?;
            }
        }
    }

    // Let in-flight calls answer before the writer goes away
    while let Some(joined) = calls.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("tools/call task failed: {}", e);
        }
    }

    tracing::info!("Tool host input closed, shutting down");
    Ok(())
}

/// Serve on this process's stdin/stdout
pub async fn serve_stdio(host: Arc<ToolHost>) -> Result<()> {
    serve(host, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Decode one frame; bytes that are not UTF-8 JSON get a parse error like any
/// other malformed line
fn parse_request(line: &[u8]) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_slice(line)
        .map_err(|e| RpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {}", e)))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(RpcResponse::error(
            id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| RpcResponse::error(id, INVALID_REQUEST, format!("invalid request: {}", e)))
}

fn handle_notification(request: &RpcRequest, initialized: &AtomicBool) {
    if request.method == METHOD_INITIALIZED {
        initialized.store(true, Ordering::SeqCst);
    }
    tracing::debug!("Notification: {}", request.method);
}
