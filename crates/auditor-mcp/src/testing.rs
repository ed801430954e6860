//! In-memory scripted workers for tests.
//!
//! A scripted worker is a background task speaking the same newline-delimited
//! JSON-RPC dialect as a real worker process, connected to the bridge through
//! a duplex pipe instead of child stdio. Calls are served concurrently, so
//! responses can complete out of order exactly as with a real worker.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::protocol::{CallToolResult, RpcError, RpcRequest, RpcResponse, PROTOCOL_VERSION};

/// Transport ends to hand to [`WorkerBridge::from_transport`].
///
/// [`WorkerBridge::from_transport`]: crate::bridge::WorkerBridge::from_transport
pub type ScriptedTransport = (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>);

/// Start a scripted worker declaring `tools` (raw `tools/list` records) and
/// answering every `tools/call` through `handler`.
pub fn scripted_worker<H, Fut>(tools: Vec<Value>, handler: H) -> ScriptedTransport
where
    H: Fn(String, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallToolResult> + Send + 'static,
{
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(run_worker(server, tools, Arc::new(handler)));
    tokio::io::split(client)
}

/// A worker that reads its input but never answers anything. Useful for
/// handshake-timeout tests.
pub fn silent_worker() -> ScriptedTransport {
    let (client, server) = tokio::io::duplex(16 * 1024);
    tokio::spawn(async move {
        let (read_half, _write_half) = tokio::io::split(server);
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });
    tokio::io::split(client)
}

async fn run_worker<H, Fut>(stream: DuplexStream, tools: Vec<Value>, handler: Arc<H>)
where
    H: Fn(String, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallToolResult> + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let writer = Arc::new(Mutex::new(write_half));
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<RpcRequest>(&line) else {
            continue;
        };
        let Some(id) = request.id else {
            // Notification (e.g. notifications/initialized); nothing to do.
            continue;
        };

        match request.method.as_str() {
            "initialize" => {
                let result = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "scripted-worker", "version": "0.0.0"},
                });
                respond(&writer, RpcResponse::success(id, result)).await;
            }
            "tools/list" => {
                let result = json!({ "tools": tools });
                respond(&writer, RpcResponse::success(id, result)).await;
            }
            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = request
                    .params
                    .get("arguments")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                // One task per call so long calls do not serialize behind
                // short ones.
                let writer = Arc::clone(&writer);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let outcome = handler(name, arguments).await;
                    let result = serde_json::to_value(outcome).unwrap_or(Value::Null);
                    respond(&writer, RpcResponse::success(id, result)).await;
                });
            }
            other => {
                let error = RpcResponse::error(
                    id,
                    RpcError::METHOD_NOT_FOUND,
                    format!("unknown method '{other}'"),
                );
                respond(&writer, error).await;
            }
        }
    }
}

async fn respond(writer: &Arc<Mutex<WriteHalf<DuplexStream>>>, response: RpcResponse) {
    let Ok(mut frame) = serde_json::to_string(&response) else {
        return;
    };
    frame.push('\n');
    let mut writer = writer.lock().await;
    let _ = writer.write_all(frame.as_bytes()).await;
    let _ = writer.flush().await;
}
