//! The decision-client boundary.
//!
//! The decision client is an opaque external service: it receives the full
//! ordered history plus the current tool catalogue and replies with either a
//! final text answer or one-or-more tool requests. Everything behind that
//! contract (provider, wire format, auth) is someone else's problem.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use auditor_core::{Message, ToolCall};
use auditor_mcp::ToolDescriptor;

/// What the decision client wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A final textual answer; the turn is over.
    Final(String),
    /// Execute these calls and come back with the observations.
    ToolRequests(Vec<ToolCall>),
}

/// Failure of the decision-client call itself. Unlike tool failures, this is
/// fatal for the current turn and propagates to the caller.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision client request failed: {0}")]
    Request(String),

    #[error("decision client returned a malformed response: {0}")]
    Malformed(String),

    #[error("decision client timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Given the full causal history and the available-actions catalogue,
    /// decide whether to answer or to request tool invocations.
    async fn decide(
        &self,
        history: &[Message],
        catalogue: &[ToolDescriptor],
    ) -> Result<Decision, DecisionError>;
}
