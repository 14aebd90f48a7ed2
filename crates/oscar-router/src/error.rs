//! Router error types

use oscar_core::AddressError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors returned by method registration. The registry is unchanged on error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid method address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("method already registered at {0}")]
    AlreadyRegistered(String),
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("core protocol error: {0}")]
    Core(#[from] oscar_core::Error),

    #[error("bundle scheduler dropped before the bundle fired")]
    SchedulerDropped,
}

impl From<oscar_core::DecodeError> for RouterError {
    fn from(e: oscar_core::DecodeError) -> Self {
        RouterError::Core(e.into())
    }
}
