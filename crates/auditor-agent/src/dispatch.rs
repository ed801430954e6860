//! Dispatch executor: resolve and run the tool calls of one turn.
//!
//! Calls within a turn are independent, so each one runs on its own task and
//! all of them are joined before the turn can advance. Every failure mode —
//! unresolved name, argument mismatch, worker error, even a panicking task —
//! folds into an error-flagged result for its call id, so the turn always
//! produces exactly one observation per request and sibling calls are never
//! cancelled.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use auditor_core::{AgentEvent, ToolCall, ToolResult};
use auditor_mcp::{validate_arguments, ToolDescriptor, ToolRegistry, WorkerBridge};

/// Execute all requested calls for one turn, concurrently, and return one
/// result per call in request order.
pub async fn dispatch_turn(
    registry: &ToolRegistry,
    calls: Vec<ToolCall>,
    events: &UnboundedSender<AgentEvent>,
) -> Vec<ToolResult> {
    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        // Resolution happens before the spawn: the registry is borrowed by
        // the loop, the task only gets owned data.
        let resolved = registry
            .resolve(&call.name)
            .map(|(bridge, descriptor)| (bridge, descriptor.clone()));
        let events = events.clone();
        let call_id = call.id.clone();
        handles.push((
            call_id,
            tokio::spawn(execute_call(resolved, call, events)),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (call_id, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("tool task for call '{call_id}' did not complete: {e}");
                results.push(ToolResult::error(call_id, "tool task did not complete"));
            }
        }
    }
    results
}

async fn execute_call(
    resolved: Option<(Arc<WorkerBridge>, ToolDescriptor)>,
    call: ToolCall,
    events: UnboundedSender<AgentEvent>,
) -> ToolResult {
    let _ = events.send(AgentEvent::ToolInvoked {
        call_id: call.id.clone(),
        tool: call.name.clone(),
        args: Value::Object(call.arguments.clone()),
    });

    let result = match resolved {
        None => ToolResult::error(
            &call.id,
            format!("tool '{}' is not provided by any connected worker", call.name),
        ),
        Some((bridge, descriptor)) => {
            match validate_arguments(&descriptor.parameters, &call.arguments) {
                Err(e) => ToolResult::error(
                    &call.id,
                    format!("invalid arguments for '{}': {e}", call.name),
                ),
                Ok(validated) => match bridge.call_tool(&call.name, validated).await {
                    Ok(outcome) => ToolResult {
                        call_id: call.id.clone(),
                        content: outcome.joined_text(),
                        is_error: outcome.is_error.unwrap_or(false),
                    },
                    Err(e) => {
                        tracing::warn!("call '{}' to tool '{}' failed: {e}", call.id, call.name);
                        ToolResult::error(&call.id, format!("tool '{}' failed: {e}", call.name))
                    }
                },
            }
        }
    };

    let _ = events.send(AgentEvent::ToolCompleted {
        call_id: result.call_id.clone(),
        tool: call.name.clone(),
        is_error: result.is_error,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_mcp::protocol::CallToolResult;
    use auditor_mcp::testing::scripted_worker;
    use auditor_mcp::WorkerBridge;
    use serde_json::{json, Map};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn registry_with_port_tool(call_timeout: Duration) -> ToolRegistry {
        let tools = vec![json!({
            "name": "get_open_ports",
            "description": "List listening ports",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "slow_scan",
            "description": "Takes forever",
            "inputSchema": {"type": "object", "properties": {}}
        })];
        let (reader, writer) = scripted_worker(tools, |name, _| async move {
            if name == "slow_scan" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            CallToolResult::text(r#"[{"port":443,"pid":100,"process":"nginx"}]"#)
        });
        let bridge = Arc::new(WorkerBridge::from_transport(
            "security",
            reader,
            writer,
            call_timeout,
        ));
        bridge.handshake().await.unwrap();

        let records = bridge.list_tools().await.unwrap();
        let descriptors = records
            .iter()
            .map(|r| ToolDescriptor::from_record("security", r))
            .collect();
        let mut registry = ToolRegistry::new();
        registry.register(bridge, descriptors);
        registry
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_result() {
        let registry = registry_with_port_tool(Duration::from_secs(5)).await;
        let (events, _rx) = mpsc::unbounded_channel();
        let call = ToolCall::new("does_not_exist", Map::new());
        let call_id = call.id.clone();

        let results = dispatch_turn(&registry, vec![call], &events).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_id, call_id);
        assert!(results[0].is_error);
        assert!(results[0].content.contains("does_not_exist"));
    }

    #[tokio::test]
    async fn test_every_call_yields_exactly_one_result_in_order() {
        let registry = registry_with_port_tool(Duration::from_millis(100)).await;
        let (events, _rx) = mpsc::unbounded_channel();

        let slow = ToolCall::new("slow_scan", Map::new());
        let fast = ToolCall::new("get_open_ports", Map::new());
        let missing = ToolCall::new("nope", Map::new());
        let ids = vec![slow.id.clone(), fast.id.clone(), missing.id.clone()];

        let results = dispatch_turn(&registry, vec![slow, fast, missing], &events).await;
        let result_ids: Vec<String> = results.iter().map(|r| r.call_id.clone()).collect();
        assert_eq!(result_ids, ids);

        // slow timed out, fast succeeded, missing unresolved
        assert!(results[0].is_error);
        assert!(!results[1].is_error);
        assert!(results[1].content.contains("443"));
        assert!(results[2].is_error);
    }

    #[tokio::test]
    async fn test_events_emitted_per_call() {
        let registry = registry_with_port_tool(Duration::from_secs(5)).await;
        let (events, mut rx) = mpsc::unbounded_channel();
        let call = ToolCall::new("get_open_ports", Map::new());
        let call_id = call.id.clone();

        dispatch_turn(&registry, vec![call], &events).await;

        let invoked = rx.recv().await.unwrap();
        assert!(matches!(invoked, AgentEvent::ToolInvoked { call_id: ref id, .. } if *id == call_id));
        let completed = rx.recv().await.unwrap();
        assert!(
            matches!(completed, AgentEvent::ToolCompleted { is_error, .. } if !is_error)
        );
    }
}
