//! The framework's unified error type.

use thiserror::Error;

use crate::bundle::BundleError;
use crate::registry::RegistryError;
use crate::util::BundleId;

#[derive(Error, Debug, Clone)]
pub enum FrameworkError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("framework exception: {0}")]
    FrameworkException(String),

    #[error("the framework is shutting down")]
    FrameworkShutdown,

    #[error("bundle {0} not found")]
    BundleNotFound(BundleId),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FrameworkError {
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        Self::IllegalArgument(reason.into())
    }

    /// Whether a retry after backoff is plausible, as opposed to a
    /// programming error the caller must fix before retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, FrameworkError::FrameworkShutdown)
    }
}
