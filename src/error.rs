//! Error types for peer-to-peer session control

use thiserror::Error;

/// Result type alias for channel operations
pub type Result<T> = std::result::Result<T, P2pError>;

/// Error surfaced to user callbacks by channel operations
#[derive(Debug, Clone, Error)]
pub enum P2pError {
    /// Operation is not permitted in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Duplicate publication, unknown stream, or signaling transport failure
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Remote capability flags forbid the requested operation
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// Coarse error kinds, one per [`P2pError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation not permitted in current session state
    InvalidState,
    /// Bad or conflicting input
    InvalidArgument,
    /// Capability flags forbid the operation
    UnsupportedMethod,
}

impl P2pError {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        P2pError::InvalidState(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        P2pError::InvalidArgument(msg.into())
    }

    /// Create an unsupported method error
    pub fn unsupported_method(msg: impl Into<String>) -> Self {
        P2pError::UnsupportedMethod(msg.into())
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            P2pError::InvalidState(_) => ErrorKind::InvalidState,
            P2pError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            P2pError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
        }
    }
}
