//! Error taxonomy for the worker layer.
//!
//! Everything here is recoverable from the orchestration loop's point of
//! view: a failing worker means fewer tools in the catalogue, a failing call
//! means an error-flagged observation. Nothing in this module should ever
//! abort a session.

use std::time::Duration;

use thiserror::Error;

/// Failures scoped to a single worker process or a single call to it.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker failed to spawn or did not complete the handshake within
    /// the startup timeout. Its tools are simply absent from the catalogue.
    #[error("worker '{worker}' failed to connect: {reason}")]
    Connection { worker: String, reason: String },

    /// The worker sent a malformed discovery or call response.
    #[error("worker '{worker}' protocol violation: {reason}")]
    Protocol { worker: String, reason: String },

    /// The worker process has exited or its channel is closed. Calls routed
    /// to it fail fast.
    #[error("worker '{worker}' is unavailable")]
    Unavailable { worker: String },

    /// No response arrived within the per-call timeout. The process itself
    /// is left running; only this call is reported as failed.
    #[error("call to '{method}' on worker '{worker}' timed out after {timeout:?}")]
    Timeout {
        worker: String,
        method: String,
        timeout: Duration,
    },
}

impl WorkerError {
    pub fn worker(&self) -> &str {
        match self {
            WorkerError::Connection { worker, .. }
            | WorkerError::Protocol { worker, .. }
            | WorkerError::Unavailable { worker }
            | WorkerError::Timeout { worker, .. } => worker,
        }
    }
}

/// Registry-level failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tool name collided across workers. The first registration wins and
    /// the collision is surfaced rather than silently overwriting.
    #[error("tool '{tool}' from worker '{worker}' collides with an existing registration from '{existing}'")]
    DuplicateTool {
        tool: String,
        worker: String,
        existing: String,
    },
}
