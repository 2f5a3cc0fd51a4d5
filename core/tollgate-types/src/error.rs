//! Wire-level error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by every component and reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidCredentials,
    RateLimited,
    PolicyDenied,
    Blocked,
    LimitExceeded,
    /// Tampered or malformed credential.
    Invalid,
    /// Time-based expiry of a credential or license.
    Expired,
    SequenceGap,
    TransientNetworkError,
    NotEntitled,
    InvalidTransition,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Returns true for definitive denials that must never be retried
    /// automatically with the same identity.
    #[must_use]
    pub fn is_definitive_denial(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::RateLimited
                | Self::PolicyDenied
                | Self::Blocked
                | Self::Invalid
        )
    }

    /// Returns true for conditions the client cache recovers from locally.
    #[must_use]
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SequenceGap | Self::TransientNetworkError | Self::Timeout
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited => "rate_limited",
            Self::PolicyDenied => "policy_denied",
            Self::Blocked => "blocked",
            Self::LimitExceeded => "limit_exceeded",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::SequenceGap => "sequence_gap",
            Self::TransientNetworkError => "transient_network_error",
            Self::NotEntitled => "not_entitled",
            Self::InvalidTransition => "invalid_transition",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
