//! Conversation data model.
//!
//! A session's history is an ordered, append-only sequence of [`Message`]s.
//! The decision client sees the full sequence on every turn, so ordering is
//! causal: a [`Message::ToolObservation`] always follows the
//! [`Message::AssistantToolRequest`] that produced it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One tool invocation requested by the decision client.
///
/// The `id` is an opaque correlation token, unique within a turn. It is
/// consumed exactly once by the dispatch executor and echoed back on the
/// matching [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of exactly one tool invocation, keyed by `call_id` so it can
/// be matched to its originating request even under concurrent fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// The system directive seeding the session.
    System { content: String },
    /// External user input.
    User { content: String },
    /// A final (or intermediate) textual answer from the decision client.
    AssistantText { content: String },
    /// The decision client requested one or more tool invocations.
    AssistantToolRequest { calls: Vec<ToolCall> },
    /// A tool result folded back into history for the next turn.
    ToolObservation { result: ToolResult },
}

/// Ordered, append-only conversation history.
///
/// Owned by exactly one orchestration session. Entries are never removed or
/// reordered; the only mutation is appending, which keeps every past turn's
/// causal record intact across multi-turn sessions.
#[derive(Debug, Default, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Create a history seeded with the system directive.
    pub fn seeded(system_directive: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::System {
                content: system_directive.into(),
            }],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::User {
            content: content.into(),
        });
    }

    pub fn push_assistant_text(&mut self, content: impl Into<String>) {
        self.messages.push(Message::AssistantText {
            content: content.into(),
        });
    }

    pub fn push_tool_request(&mut self, calls: Vec<ToolCall>) {
        self.messages.push(Message::AssistantToolRequest { calls });
    }

    pub fn push_observation(&mut self, result: ToolResult) {
        self.messages.push(Message::ToolObservation { result });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent assistant text, if any. This is the session's output
    /// for the external request once a turn reaches its terminal state.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::AssistantText { content } => Some(content.as_str()),
            _ => None,
        })
    }
}
