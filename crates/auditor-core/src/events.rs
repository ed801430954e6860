//! Lifecycle events for display.
//!
//! Everything that happens in the orchestration loop is mirrored onto an
//! unbounded channel of [`AgentEvent`]s so a front end can render connection
//! status, tool activity and errors as they occur. The stream is purely
//! advisory: dropping the receiver never affects correctness.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A human-readable lifecycle event emitted by the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A worker process connected and its tools were registered.
    WorkerConnected { worker: String, tool_count: usize },

    /// A worker failed to start or handshake; its tools are absent from the
    /// catalogue and the session continues without them.
    WorkerFailed { worker: String, error: String },

    /// A tool name collided with one already registered by another worker.
    ToolCollision { worker: String, tool: String },

    /// A new turn started for a user submission.
    TurnStarted { turn_id: String },

    /// The decision client is being queried with the full history.
    DecisionRequested { turn_id: String, message_count: usize },

    /// A tool invocation was dispatched to its owning worker.
    ToolInvoked {
        call_id: String,
        tool: String,
        args: Value,
    },

    /// A tool invocation produced its result (possibly error-flagged).
    ToolCompleted {
        call_id: String,
        tool: String,
        is_error: bool,
    },

    /// The turn ended with a final answer.
    TurnCompleted { turn_id: String },

    /// The decision client call itself failed; the turn is over.
    TurnFailed { turn_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = AgentEvent::WorkerConnected {
            worker: "security".into(),
            tool_count: 4,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"worker_connected\""));
        assert!(json.contains("\"tool_count\":4"));
    }
}
