//! Typed errors surfaced by the session clients and the loop.

use serde::{Deserialize, Serialize};

/// Failure of one client call.
///
/// `SessionCloseFailed` is never fatal; every other kind ends the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    #[error("session creation failed: {0}")]
    SessionCreationFailed(String),
    #[error("planning failed: {0}")]
    PlanningFailed(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("session close failed: {0}")]
    SessionCloseFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl OperatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionCreationFailed(_) => ErrorKind::SessionCreationFailed,
            Self::PlanningFailed(_) => ErrorKind::PlanningFailed,
            Self::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            Self::SessionCloseFailed(_) => ErrorKind::SessionCloseFailed,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }
}

/// Stable classification for failures, used in snapshots and transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionCreationFailed,
    PlanningFailed,
    ExecutionFailed,
    SessionCloseFailed,
    MalformedResponse,
    /// The run was stopped by an external close request.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreationFailed => "session_creation_failed",
            Self::PlanningFailed => "planning_failed",
            Self::ExecutionFailed => "execution_failed",
            Self::SessionCloseFailed => "session_close_failed",
            Self::MalformedResponse => "malformed_response",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "cancelled by user".to_string(),
        }
    }
}

impl From<&OperatorError> for Failure {
    fn from(err: &OperatorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
