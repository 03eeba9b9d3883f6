//! The crate's unified error type.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EarpmError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("not connected to a broker")]
    NotConnected,

    #[error("resource exhausted: {0}")]
    Enomem(String),

    #[error("operation timed out")]
    Timeout,

    #[error("framework exception: {0}")]
    FrameworkException(String),

    #[error("shutting down")]
    Shutdown,
}

impl EarpmError {
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        Self::IllegalArgument(reason.into())
    }

    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState(reason.into())
    }

    /// Whether a retry after backoff is plausible, as opposed to a
    /// programming error the caller must fix before retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, EarpmError::NotConnected | EarpmError::Timeout | EarpmError::Shutdown)
    }
}
