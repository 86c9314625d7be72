//! Request-level error type.
//!
//! Every component returns [`ConnectorError`] (or an error that converts into
//! it). Each variant is terminal for the request and maps onto one
//! [`ErrorKind`], which in turn fixes the HTTP status code and the failure
//! envelope sent back to the client.

use protocol::{Envelope, ErrorKind, ProtocolError};
use thiserror::Error;

use crate::auth::AuthError;
use crate::files::GuardError;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors surfaced to clients as failure envelopes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectorError {
    /// Missing or incorrect credential.
    #[error("Unauthorized")]
    Unauthorized,

    /// Path escapes the sandbox or is blacklisted.
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Path does not exist or I/O failed on it.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No route matches the method and path.
    #[error("Bad request")]
    InvalidRoute,

    /// Malformed body or semantic violation.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ConnectorError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Unauthorized => ErrorKind::Unauthorized,
            ConnectorError::Forbidden(_) => ErrorKind::Forbidden,
            ConnectorError::NotFound(_) => ErrorKind::NotFound,
            ConnectorError::InvalidRoute | ConnectorError::BadRequest(_) => ErrorKind::BadRequest,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Failure envelope describing this error.
    pub fn to_envelope(&self) -> Envelope<String> {
        Envelope::failure(self.to_string())
    }
}

impl From<GuardError> for ConnectorError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::NotFound(path) => ConnectorError::NotFound(path),
            GuardError::OutsideSandbox(path)
            | GuardError::Blacklisted(path)
            | GuardError::PathTraversal(path)
            | GuardError::UnsupportedType(path)
            | GuardError::PermissionDenied(path) => ConnectorError::Forbidden(path),
            GuardError::AlreadyExists(path) => {
                ConnectorError::BadRequest(format!("File '{}' already exists", path))
            }
            GuardError::NotADirectory(path) => {
                ConnectorError::BadRequest(format!("'{}' is not a directory", path))
            }
            GuardError::InvalidPath(reason) => ConnectorError::BadRequest(reason),
            GuardError::Io { path, .. } => ConnectorError::NotFound(path),
        }
    }
}

impl From<AuthError> for ConnectorError {
    fn from(_: AuthError) -> Self {
        ConnectorError::Unauthorized
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::NotFound(err.to_string())
    }
}

impl From<ProtocolError> for ConnectorError {
    fn from(err: ProtocolError) -> Self {
        ConnectorError::BadRequest(err.to_string())
    }
}
