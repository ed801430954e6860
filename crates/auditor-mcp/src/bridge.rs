//! Process bridge: one worker process as an RPC peer.
//!
//! Each bridge owns exactly one worker child process and a private
//! newline-delimited JSON-RPC channel over its stdio; no transport is shared
//! across workers, so a slow or dead worker never blocks calls routed to
//! another. Requests carry monotonically increasing ids and a background
//! reader task routes each response to the waiting caller through a pending
//! map, so responses may arrive in any order.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::{interpolate_env_vars, WorkerConfig};
use crate::error::WorkerError;
use crate::protocol::{
    CallToolResult, RpcRequest, RpcResponse, ToolRecord, ToolsListResult, PROTOCOL_VERSION,
};

/// Senders for requests still waiting on a response. `None` once the channel
/// has closed, so new requests fail fast instead of queueing forever.
type PendingMap = Arc<SyncMutex<Option<HashMap<u64, oneshot::Sender<RpcResponse>>>>>;

/// Bridge to one worker process.
pub struct WorkerBridge {
    name: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    call_timeout: Duration,
    child: Mutex<Option<Child>>,
    reader_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("name", &self.name)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl WorkerBridge {
    /// Spawn the worker process and complete the capability handshake.
    ///
    /// The child inherits the caller's environment plus the config's
    /// overrides. Spawn and handshake together are bounded by the config's
    /// startup timeout; any failure inside that window is a
    /// [`WorkerError::Connection`].
    pub async fn spawn(name: &str, config: &WorkerConfig) -> Result<Self, WorkerError> {
        let connection_err = |reason: String| WorkerError::Connection {
            worker: name.to_string(),
            reason,
        };

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            cmd.env(key, interpolate_env_vars(value));
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| connection_err(format!("failed to spawn '{}': {e}", config.command)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_err("worker stdout not captured".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection_err("worker stdin not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(name.to_string(), stderr);
        }

        let bridge = Self::from_transport(name, stdout, stdin, config.call_timeout());
        *bridge.child.lock().await = Some(child);

        match tokio::time::timeout(config.startup_timeout(), bridge.handshake()).await {
            Ok(Ok(())) => Ok(bridge),
            Ok(Err(e)) => {
                bridge.shutdown().await;
                Err(connection_err(format!("handshake failed: {e}")))
            }
            Err(_) => {
                bridge.shutdown().await;
                Err(connection_err(format!(
                    "handshake timed out after {:?}",
                    config.startup_timeout()
                )))
            }
        }
    }

    /// Build a bridge over an arbitrary transport. Used by [`spawn`] for the
    /// child's stdio and by tests for in-memory duplex pipes.
    ///
    /// Must be called from within a tokio runtime: the reader task is
    /// spawned here.
    ///
    /// [`spawn`]: WorkerBridge::spawn
    pub fn from_transport<R, W>(name: &str, reader: R, writer: W, call_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(SyncMutex::new(Some(HashMap::new())));
        let reader_task = spawn_reader(name.to_string(), reader, Arc::clone(&pending));
        Self {
            name: name.to_string(),
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
            child: Mutex::new(None),
            reader_task: SyncMutex::new(Some(reader_task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perform the `initialize` handshake followed by the
    /// `notifications/initialized` notification.
    pub async fn handshake(&self) -> Result<(), WorkerError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "auditor",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.request("initialize", params).await?;
        if !result.is_object() {
            return Err(self.protocol_err("initialize result is not an object"));
        }
        self.send_notification("notifications/initialized").await?;
        tracing::debug!(worker = %self.name, "handshake complete");
        Ok(())
    }

    /// Request the worker's declared operations.
    pub async fn list_tools(&self) -> Result<Vec<ToolRecord>, WorkerError> {
        let result = self.request("tools/list", json!({})).await?;
        let listed: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| self.protocol_err(format!("malformed tools/list result: {e}")))?;
        Ok(listed.tools)
    }

    /// Invoke one tool and await its correlated response.
    ///
    /// A timeout here is call-level, not process-level: the worker keeps
    /// running and only this call is reported as failed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, WorkerError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", params).await?;
        serde_json::from_value(result)
            .map_err(|e| self.protocol_err(format!("malformed tools/call result: {e}")))
    }

    /// Close the channel and terminate the worker. Idempotent and safe to
    /// call after a prior failure or a bridge that never finished startup.
    pub async fn shutdown(&self) {
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            tracing::debug!(worker = %self.name, "worker process terminated");
        }
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        // Wake anything still waiting on a response.
        *self.pending.lock() = None;
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(map) => {
                    map.insert(id, tx);
                }
                None => return Err(self.unavailable()),
            }
        }

        let request = RpcRequest::new(id, method, params);
        if let Err(e) = self.write_frame(&request).await {
            self.forget_pending(id);
            return Err(e);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.error {
                    return Err(self.protocol_err(format!(
                        "rpc error {} on '{method}': {}",
                        error.code, error.message
                    )));
                }
                response
                    .result
                    .ok_or_else(|| self.protocol_err(format!("'{method}' response has no result")))
            }
            // Sender dropped: the reader task ended, the channel is closed.
            Ok(Err(_)) => Err(self.unavailable()),
            Err(_) => {
                self.forget_pending(id);
                Err(WorkerError::Timeout {
                    worker: self.name.clone(),
                    method: method.to_string(),
                    timeout: self.call_timeout,
                })
            }
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), WorkerError> {
        self.write_frame(&RpcRequest::notification(method)).await
    }

    async fn write_frame(&self, request: &RpcRequest) -> Result<(), WorkerError> {
        let mut frame = serde_json::to_string(request)
            .map_err(|e| self.protocol_err(format!("failed to encode request: {e}")))?;
        frame.push('\n');
        let mut writer = self.writer.lock().await;
        if writer.write_all(frame.as_bytes()).await.is_err() || writer.flush().await.is_err() {
            return Err(self.unavailable());
        }
        Ok(())
    }

    fn forget_pending(&self, id: u64) {
        if let Some(map) = self.pending.lock().as_mut() {
            map.remove(&id);
        }
    }

    fn unavailable(&self) -> WorkerError {
        WorkerError::Unavailable {
            worker: self.name.clone(),
        }
    }

    fn protocol_err(&self, reason: impl Into<String>) -> WorkerError {
        WorkerError::Protocol {
            worker: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Read frames off the worker's output and route responses to their waiting
/// callers. Runs until EOF or a read error, then drops every pending sender
/// so outstanding and future requests fail fast.
fn spawn_reader<R>(name: String, reader: R, pending: PendingMap) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    route_frame(&name, line, &pending);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(worker = %name, "read error on worker channel: {e}");
                    break;
                }
            }
        }
        *pending.lock() = None;
        tracing::debug!(worker = %name, "worker channel closed");
    })
}

fn route_frame(name: &str, line: &str, pending: &PendingMap) {
    let frame: Value = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(worker = %name, "discarding unparseable frame: {e}");
            return;
        }
    };

    // Worker-initiated requests and notifications carry a method; nothing in
    // this system subscribes to them.
    if frame.get("method").is_some() {
        tracing::debug!(worker = %name, "ignoring worker-initiated message");
        return;
    }

    let response: RpcResponse = match serde_json::from_value(frame) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(worker = %name, "discarding malformed response: {e}");
            return;
        }
    };
    let Some(id) = response.id.as_u64() else {
        tracing::warn!(worker = %name, "discarding response with non-numeric id");
        return;
    };

    let sender = pending.lock().as_mut().and_then(|map| map.remove(&id));
    match sender {
        Some(sender) => {
            let _ = sender.send(response);
        }
        // Late response after a call-level timeout, or an id we never sent.
        None => tracing::debug!(worker = %name, id, "dropping uncorrelated response"),
    }
}

/// Forward the worker's stderr into the tracing log so worker diagnostics
/// are visible without polluting the protocol channel.
fn drain_stderr<R>(name: String, stderr: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(worker = %name, "[stderr] {line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scripted_worker, silent_worker};

    const FAST: Duration = Duration::from_secs(5);

    fn port_tools() -> Vec<Value> {
        vec![json!({
            "name": "get_open_ports",
            "description": "List listening ports",
            "inputSchema": {"type": "object", "properties": {}}
        })]
    }

    #[tokio::test]
    async fn test_handshake_and_list_tools() {
        let (reader, writer) =
            scripted_worker(port_tools(), |_, _| async { CallToolResult::text("") });
        let bridge = WorkerBridge::from_transport("security", reader, writer, FAST);

        bridge.handshake().await.unwrap();
        let tools = bridge.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_open_ports");
    }

    #[tokio::test]
    async fn test_call_tool_returns_correlated_result() {
        let (reader, writer) = scripted_worker(port_tools(), |name, _| async move {
            assert_eq!(name, "get_open_ports");
            CallToolResult::text(r#"[{"port":443,"pid":100,"process":"nginx"}]"#)
        });
        let bridge = WorkerBridge::from_transport("security", reader, writer, FAST);
        bridge.handshake().await.unwrap();

        let result = bridge
            .call_tool("get_open_ports", Map::new())
            .await
            .unwrap();
        assert!(result.joined_text().contains("nginx"));
        assert_ne!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_concurrent_calls_correlate_out_of_order() {
        // The first-issued call answers last; each caller must still get
        // its own response.
        let (reader, writer) = scripted_worker(port_tools(), |_, args| async move {
            let delay = args
                .get("delay_ms")
                .and_then(Value::as_u64)
                .unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            CallToolResult::text(format!("slept {delay}"))
        });
        let bridge =
            Arc::new(WorkerBridge::from_transport("security", reader, writer, FAST));
        bridge.handshake().await.unwrap();

        let slow = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let mut args = Map::new();
                args.insert("delay_ms".into(), json!(200));
                bridge.call_tool("get_open_ports", args).await
            })
        };
        let fast = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let mut args = Map::new();
                args.insert("delay_ms".into(), json!(0));
                bridge.call_tool("get_open_ports", args).await
            })
        };

        assert_eq!(fast.await.unwrap().unwrap().joined_text(), "slept 0");
        assert_eq!(slow.await.unwrap().unwrap().joined_text(), "slept 200");
    }

    #[tokio::test]
    async fn test_call_timeout_is_call_level() {
        let (reader, writer) = scripted_worker(port_tools(), |_, args| async move {
            if args.contains_key("hang") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            CallToolResult::text("ok")
        });
        let bridge = WorkerBridge::from_transport(
            "security",
            reader,
            writer,
            Duration::from_millis(100),
        );
        bridge.handshake().await.unwrap();

        let mut args = Map::new();
        args.insert("hang".into(), json!(true));
        let err = bridge.call_tool("get_open_ports", args).await.unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { .. }));

        // The worker is still alive and serves the next call.
        let result = bridge
            .call_tool("get_open_ports", Map::new())
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "ok");
    }

    #[tokio::test]
    async fn test_dead_channel_fails_fast() {
        let (reader, writer) =
            scripted_worker(port_tools(), |_, _| async { CallToolResult::text("ok") });
        let bridge = WorkerBridge::from_transport("security", reader, writer, FAST);
        bridge.handshake().await.unwrap();

        bridge.shutdown().await;
        let err = bridge.call_tool("get_open_ports", Map::new()).await;
        assert!(matches!(err, Err(WorkerError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (reader, writer) =
            scripted_worker(port_tools(), |_, _| async { CallToolResult::text("ok") });
        let bridge = WorkerBridge::from_transport("security", reader, writer, FAST);
        bridge.shutdown().await;
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_worker_times_out_handshake() {
        let (reader, writer) = silent_worker();
        let bridge = WorkerBridge::from_transport(
            "broken",
            reader,
            writer,
            Duration::from_millis(100),
        );
        let err = bridge.handshake().await.unwrap_err();
        assert!(matches!(err, WorkerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_connection_error() {
        let config = WorkerConfig::new("/nonexistent/worker-binary", vec![]);
        let err = WorkerBridge::spawn("ghost", &config).await.unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_malformed_list_result_is_protocol_error() {
        // A hand-rolled peer that answers everything with a result the
        // client cannot decode as a tool list.
        let (client, server) = tokio::io::duplex(16 * 1024);
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<RpcRequest>(&line) else {
                    continue;
                };
                let Some(id) = request.id else { continue };
                let response = RpcResponse::success(id, json!({"tools": "not-a-list"}));
                let mut frame = serde_json::to_string(&response).unwrap();
                frame.push('\n');
                let _ = write_half.write_all(frame.as_bytes()).await;
            }
        });

        let (reader, writer) = tokio::io::split(client);
        let bridge = WorkerBridge::from_transport("odd", reader, writer, FAST);
        let err = bridge.list_tools().await.unwrap_err();
        assert!(matches!(err, WorkerError::Protocol { .. }));
    }
}
