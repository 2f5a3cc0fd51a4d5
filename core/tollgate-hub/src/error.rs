//! Error types for the hub.

use thiserror::Error;
use tollgate_credential::CredentialError;
use tollgate_types::ErrorCode;

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur in hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// I/O error on a connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame larger than the protocol allows.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Unexpected or malformed message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The subscriber's token failed verification.
    #[error("unauthorized: {0}")]
    Credential(#[from] CredentialError),

    /// The subscriber's token does not cover the requested topic.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The peer sent an error frame.
    #[error("remote error ({code}): {message}")]
    Remote { code: ErrorCode, message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timed out waiting for the peer.
    #[error("operation timed out")]
    Timeout,

    /// The connection or subscription closed.
    #[error("connection closed")]
    Closed,
}

impl HubError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Credential(e) => e.code(),
            Self::Unauthorized(_) => ErrorCode::PolicyDenied,
            Self::Remote { code, .. } => *code,
            Self::Timeout => ErrorCode::Timeout,
            Self::FrameTooLarge(_) | Self::Protocol(_) | Self::Serialization(_) => {
                ErrorCode::Invalid
            }
            Self::Io(_) | Self::Closed => ErrorCode::TransientNetworkError,
        }
    }
}
