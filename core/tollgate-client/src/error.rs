//! Error types for the client cache.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tollgate_types::ErrorCode;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The token is not valid. The cache has been purged.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The token expired. Re-authenticate.
    #[error("credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// The entitlement source could not be reached.
    #[error("transient network error: {0}")]
    Transient(String),

    /// No snapshot has been pulled yet.
    #[error("cache is not bootstrapped")]
    NotBootstrapped,

    /// A pushed event skipped sequences. Nothing was applied and a pull is
    /// pending.
    #[error("sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },
}

impl CacheError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Invalid(_) => ErrorCode::Invalid,
            Self::Expired { .. } => ErrorCode::Expired,
            Self::Transient(_) => ErrorCode::TransientNetworkError,
            Self::NotBootstrapped => ErrorCode::NotFound,
            Self::SequenceGap { .. } => ErrorCode::SequenceGap,
        }
    }

    /// Maps an error code reported by a remote peer.
    pub fn from_remote(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCode::Invalid => Self::Invalid(message),
            ErrorCode::Expired => Self::Expired {
                expired_at: Utc::now(),
            },
            _ => Self::Transient(message),
        }
    }
}
