//! Error types for orchestrator calls.

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned by an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid docker host {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("could not connect to docker: {0}")]
    Connect(String),

    #[error("docker request failed: {0}")]
    Request(String),

    #[error("docker returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode docker response: {0}")]
    Decode(String),

    #[error("service not found: {0}")]
    NotFound(String),

    #[error("can't scale service {0}: not in replicated mode")]
    NotReplicated(String),

    #[error("event stream failed: {0}")]
    Stream(String),

    #[error("event stream closed by docker")]
    StreamClosed,
}
