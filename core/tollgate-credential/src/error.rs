//! Error types for the credential codec.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tollgate_types::ErrorCode;

/// Credential-specific errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Structural, key or signature failure. Not recoverable with this token.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// Signature is valid but the token is past its expiry.
    #[error("credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// The codec only holds verifying keys.
    #[error("codec has no signing key")]
    NoSigningKey,

    /// Serialization error while issuing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CredentialError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Invalid(_) => ErrorCode::Invalid,
            Self::Expired { .. } => ErrorCode::Expired,
            Self::NoSigningKey | Self::Serialization(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;
