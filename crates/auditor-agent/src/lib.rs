//! Conversation orchestration for the auditor agent.
//!
//! The loop alternates between asking the decision client what to do next
//! and executing the tool calls it requests, folding every result back into
//! an append-only history until the client answers without requesting tools.

pub mod client;
pub mod dispatch;
pub mod gemini;
pub mod prompt;
pub mod session;

pub use client::{Decision, DecisionClient, DecisionError};
pub use gemini::GeminiClient;
pub use prompt::SYSTEM_PROMPT;
pub use session::{AgentError, Session, SessionConfig, TurnPhase};
