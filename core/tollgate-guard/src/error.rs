//! Error types for the access guard.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tollgate_credential::CredentialError;
use tollgate_store::StoreError;
use tollgate_types::{ErrorCode, LicenseStatus};

/// Result type for authentication.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for revalidation and refresh.
pub type RevalidateResult<T> = Result<T, RevalidateError>;

/// Why an authentication attempt was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The source address is blocked.
    #[error("address blocked until {until}")]
    Blocked { until: DateTime<Utc> },

    /// Too many attempts for this identity from this address.
    #[error("too many attempts, retry after {}s", retry_after.num_seconds())]
    RateLimited { retry_after: Duration },

    /// The origin policy refused the source.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Unknown identity or wrong secret.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The license does not grant access.
    #[error("license is not entitled (status {status})")]
    NotEntitled { status: LicenseStatus },

    /// The caller's deadline passed.
    #[error("authentication timed out")]
    Timeout,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Blocked { .. } => ErrorCode::Blocked,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::PolicyDenied(_) => ErrorCode::PolicyDenied,
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::NotEntitled { .. } => ErrorCode::NotEntitled,
            Self::Timeout => ErrorCode::Timeout,
            Self::Credential(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Why a token could not be revalidated or refreshed.
#[derive(Debug, Error)]
pub enum RevalidateError {
    /// The token or its session is not valid. Discard it.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The token is authentic but expired. Re-authenticate.
    #[error("credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// Refresh refused: the license does not grant access.
    #[error("license is not entitled (status {status})")]
    NotEntitled { status: LicenseStatus },

    #[error(transparent)]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RevalidateError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Invalid(_) => ErrorCode::Invalid,
            Self::Expired { .. } => ErrorCode::Expired,
            Self::NotEntitled { .. } => ErrorCode::NotEntitled,
            Self::Store(e) => e.code(),
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<CredentialError> for RevalidateError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Expired { expired_at } => Self::Expired { expired_at },
            CredentialError::Invalid(reason) => Self::Invalid(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for RevalidateError {
    fn from(e: StoreError) -> Self {
        match e {
            // The license behind a verified token is gone.
            StoreError::NotFound(client_id) => Self::Invalid(format!("no license for {client_id}")),
            other => Self::Store(other),
        }
    }
}
