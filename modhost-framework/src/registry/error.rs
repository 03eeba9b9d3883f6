//! Error type for the service registry.

use thiserror::Error;

use crate::util::ServiceId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("service {0} is not registered")]
    NotRegistered(ServiceId),

    #[error("service {0} has already been unregistered")]
    AlreadyUnregistered(ServiceId),

    #[error("filter is invalid: {0}")]
    InvalidFilter(String),
}

impl RegistryError {
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        Self::IllegalArgument(reason.into())
    }
}
