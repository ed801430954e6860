//! The conversation state machine.
//!
//! One session owns one append-only history and drives the
//! decide/act/observe cycle for each external submission. The machine is
//! single-flight: `submit` takes `&mut self`, so only one decision-client
//! call is ever outstanding for a session, and the loop never asks the
//! client again while any tool call of the current turn is unresolved —
//! `dispatch_turn` joins every call before returning.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use auditor_core::{AgentEvent, ConversationState, Message};
use auditor_mcp::{ToolDescriptor, ToolRegistry};

use crate::client::{Decision, DecisionClient, DecisionError};
use crate::dispatch::dispatch_turn;

/// Where the machine currently is in the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Ready for (or between) decision-client calls.
    AwaitingDecision,
    /// A decision-client call is outstanding.
    Deciding,
    /// One or more tool calls of the current turn are unresolved.
    AwaitingToolResults,
    /// The last turn ended with a final answer.
    Terminal,
}

/// Session-fatal failures. Tool-level failures never surface here; they are
/// folded into history as error observations instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    DecisionClient(#[from] DecisionError),

    #[error("turn exceeded {0} decision cycles without completing")]
    CycleLimit(usize),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on each decision-client call.
    pub decision_timeout: Duration,
    /// Bound on decide/act cycles within one submission, so a decision
    /// client that keeps requesting tools cannot spin forever.
    pub max_cycles: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_secs(120),
            max_cycles: 25,
        }
    }
}

/// One orchestration session: a history, a tool catalogue and a decision
/// client, alive for as long as the caller keeps it.
pub struct Session {
    state: ConversationState,
    registry: Arc<ToolRegistry>,
    client: Arc<dyn DecisionClient>,
    events: UnboundedSender<AgentEvent>,
    config: SessionConfig,
    phase: TurnPhase,
}

impl Session {
    pub fn new(
        system_directive: &str,
        registry: Arc<ToolRegistry>,
        client: Arc<dyn DecisionClient>,
        events: UnboundedSender<AgentEvent>,
    ) -> Self {
        Self::with_config(
            system_directive,
            registry,
            client,
            events,
            SessionConfig::default(),
        )
    }

    pub fn with_config(
        system_directive: &str,
        registry: Arc<ToolRegistry>,
        client: Arc<dyn DecisionClient>,
        events: UnboundedSender<AgentEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: ConversationState::seeded(system_directive),
            registry,
            client,
            events,
            config,
            phase: TurnPhase::AwaitingDecision,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn history(&self) -> &[Message] {
        self.state.messages()
    }

    /// Process one external user submission to completion.
    ///
    /// History is carried forward across submissions, so multi-turn sessions
    /// share cumulative context; a new submission simply re-enters the cycle.
    pub async fn submit(&mut self, user_text: &str) -> Result<String, AgentError> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let _ = self.events.send(AgentEvent::TurnStarted {
            turn_id: turn_id.clone(),
        });

        self.phase = TurnPhase::AwaitingDecision;
        self.state.push_user(user_text);
        let catalogue = self.registry.describe_all();

        for _ in 0..self.config.max_cycles {
            match self.decide(&turn_id, &catalogue).await? {
                Decision::Final(text) => {
                    self.state.push_assistant_text(&text);
                    self.phase = TurnPhase::Terminal;
                    let _ = self.events.send(AgentEvent::TurnCompleted {
                        turn_id: turn_id.clone(),
                    });
                    return Ok(text);
                }
                Decision::ToolRequests(calls) => {
                    tracing::debug!("decision client requested {} tool call(s)", calls.len());
                    // All requested calls are recorded before dispatch begins.
                    self.state.push_tool_request(calls.clone());
                    self.phase = TurnPhase::AwaitingToolResults;

                    let results = dispatch_turn(&self.registry, calls, &self.events).await;
                    for result in results {
                        self.state.push_observation(result);
                    }
                    self.phase = TurnPhase::AwaitingDecision;
                }
            }
        }

        let error = AgentError::CycleLimit(self.config.max_cycles);
        let _ = self.events.send(AgentEvent::TurnFailed {
            turn_id,
            error: error.to_string(),
        });
        Err(error)
    }

    async fn decide(
        &mut self,
        turn_id: &str,
        catalogue: &[ToolDescriptor],
    ) -> Result<Decision, AgentError> {
        self.phase = TurnPhase::Deciding;
        let _ = self.events.send(AgentEvent::DecisionRequested {
            turn_id: turn_id.to_string(),
            message_count: self.state.len(),
        });

        let decision = match tokio::time::timeout(
            self.config.decision_timeout,
            self.client.decide(self.state.messages(), catalogue),
        )
        .await
        {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => return Err(self.turn_failed(turn_id, e)),
            Err(_) => {
                let e = DecisionError::Timeout(self.config.decision_timeout);
                return Err(self.turn_failed(turn_id, e));
            }
        };
        Ok(decision)
    }

    fn turn_failed(&self, turn_id: &str, error: DecisionError) -> AgentError {
        tracing::error!("decision client failed for turn '{turn_id}': {error}");
        let _ = self.events.send(AgentEvent::TurnFailed {
            turn_id: turn_id.to_string(),
            error: error.to_string(),
        });
        AgentError::DecisionClient(error)
    }
}
