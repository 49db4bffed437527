//! Typed error taxonomy for the configuration governance core.
//!
//! Every public operation returns `Result<T, CoreError>` so callers outside
//! the core (an HTTP layer, a CLI, a test) can match on `.kind()` instead of
//! pattern-matching on message text.

use thiserror::Error;

/// Coarse-grained error classification, stable across the core's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    StateConflict,
    GitFailure,
    IoFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("git operation failed: {0}")]
    GitFailure(#[source] git2::Error),

    #[error("io failure: {0}")]
    IoFailure(#[source] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::GitFailure(_) => ErrorKind::GitFailure,
            Self::IoFailure(_) => ErrorKind::IoFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<git2::Error> for CoreError {
    fn from(e: git2::Error) -> Self {
        if e.code() == git2::ErrorCode::NotFound {
            Self::NotFound(e.message().to_string())
        } else {
            Self::GitFailure(e)
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(e.to_string())
        } else {
            Self::IoFailure(e)
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("json: {e}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
