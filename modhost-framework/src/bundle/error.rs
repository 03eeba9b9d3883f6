//! Error type for bundle lifecycle operations.

use thiserror::Error;

use crate::util::BundleId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("bundle {0} is in state {1:?}, which does not permit this operation")]
    IllegalState(BundleId, super::lifecycle::BundleState),

    #[error("bundle {0} not found")]
    NotFound(BundleId),

    #[error("activator for bundle {0} failed: {1}")]
    ActivatorFailed(BundleId, String),

    #[error("library load failed for bundle {0}: {1}")]
    LibraryLoadFailed(BundleId, String),
}

impl BundleError {
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        Self::IllegalArgument(reason.into())
    }
}
