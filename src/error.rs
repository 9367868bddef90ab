//! Error types
//!
//! Each component has its own error enum; `Error` is the crate-level type
//! returned by the broker's service operations. `status_code()` maps an error
//! to the status a streaming adapter reports to its peer.

use crate::activation::ActivationError;
use crate::directory::DirectoryError;
use crate::message::DevAddr;
use crate::registry::RegistryError;
use crate::session::AuthError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed frame or request
    InvalidArgument(String),
    /// Connection context failed validation
    Unauthenticated(AuthError),
    /// Authenticated caller may not perform this operation
    PermissionDenied(String),
    /// A session with this id is already active
    AlreadyActive(String),
    /// No active session with this id
    NotFound(String),
    /// No router can currently reach the device
    NoRoute(DevAddr),
    /// The directory cannot resolve an owner for the device or application
    UnroutableDevice(DirectoryError),
    /// The activation attempt exceeded its deadline
    Timeout,
    /// The handler rejected the activation
    ActivationRejected(String),
    /// The handler failed to answer the activation
    HandlerUnavailable(String),
}

/// Transport-level status for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    AlreadyExists,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    FailedPrecondition,
}

impl Error {
    /// Status the adapter should report for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::InvalidArgument,
            Error::Unauthenticated(_) => StatusCode::Unauthenticated,
            Error::PermissionDenied(_) => StatusCode::PermissionDenied,
            Error::AlreadyActive(_) => StatusCode::AlreadyExists,
            Error::NotFound(_) | Error::UnroutableDevice(_) => StatusCode::NotFound,
            Error::NoRoute(_) | Error::HandlerUnavailable(_) => StatusCode::Unavailable,
            Error::Timeout => StatusCode::DeadlineExceeded,
            Error::ActivationRejected(_) => StatusCode::FailedPrecondition,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(what) => write!(f, "Invalid argument: {}", what),
            Error::Unauthenticated(e) => write!(f, "Unauthenticated: {}", e),
            Error::PermissionDenied(what) => write!(f, "Permission denied: {}", what),
            Error::AlreadyActive(id) => write!(f, "Session already active: {}", id),
            Error::NotFound(id) => write!(f, "Session not found: {}", id),
            Error::NoRoute(dev_addr) => write!(f, "No route to device {}", dev_addr),
            Error::UnroutableDevice(e) => write!(f, "Unroutable device: {}", e),
            Error::Timeout => write!(f, "Activation timed out"),
            Error::ActivationRejected(reason) => write!(f, "Activation rejected: {}", reason),
            Error::HandlerUnavailable(reason) => write!(f, "Handler unavailable: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Unauthenticated(e) => Some(e),
            Error::UnroutableDevice(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyActive(id) => Error::AlreadyActive(id),
            RegistryError::NotFound(id) => Error::NotFound(id),
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Unauthenticated(err)
    }
}

impl From<DirectoryError> for Error {
    fn from(err: DirectoryError) -> Self {
        Error::UnroutableDevice(err)
    }
}

impl From<ActivationError> for Error {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::Unroutable(e) => Error::UnroutableDevice(e),
            ActivationError::Rejected(reason) => Error::ActivationRejected(reason),
            ActivationError::HandlerFailed(reason) => Error::HandlerUnavailable(reason),
            ActivationError::Timeout => Error::Timeout,
        }
    }
}
