//! Foundation types for the auditor agent.
//!
//! This crate sits at the bottom of the workspace dependency hierarchy and
//! has zero internal crate dependencies. It defines the conversation data
//! model shared by the worker layer and the orchestration loop, plus the
//! lifecycle event stream consumed by whatever front end is attached.

pub mod events;
pub mod message;

pub use events::AgentEvent;
pub use message::{ConversationState, Message, ToolCall, ToolResult};
