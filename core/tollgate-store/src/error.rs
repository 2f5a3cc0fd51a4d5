//! Error types for the entitlement store.

use thiserror::Error;
use tollgate_types::{ClientId, ErrorCode, LicenseStatus};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No license exists for the client.
    #[error("license not found: {0}")]
    NotFound(ClientId),

    /// A non-revoked license already exists for the client.
    #[error("license already exists: {0}")]
    AlreadyExists(ClientId),

    /// The license is revoked; only a new generation can replace it.
    #[error("license revoked: {0}")]
    Revoked(ClientId),

    /// The operation does not apply to the license's current status.
    #[error("cannot {operation} license {client_id} in status {from}")]
    InvalidTransition {
        client_id: ClientId,
        from: LicenseStatus,
        operation: &'static str,
    },

    /// The plan's usage ceiling for the current cycle would be exceeded.
    #[error("usage limit exceeded: {used} + {requested} > {ceiling}")]
    LimitExceeded {
        used: u64,
        requested: u64,
        ceiling: u64,
    },

    /// The license does not currently grant access.
    #[error("license {client_id} is not entitled (status {status})")]
    NotEntitled {
        client_id: ClientId,
        status: LicenseStatus,
    },

    /// An identity with this name is already registered.
    #[error("identity already registered: {0}")]
    IdentityExists(String),

    /// Compare-and-swap kept losing against concurrent writers.
    #[error("write conflict on {0}")]
    Conflict(ClientId),

    /// Secret hashing failed.
    #[error("secret hashing failed: {0}")]
    Hashing(String),

    /// Backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) | Self::IdentityExists(_) => ErrorCode::AlreadyExists,
            Self::Revoked(_) | Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            Self::NotEntitled { .. } => ErrorCode::NotEntitled,
            Self::Conflict(_)
            | Self::Hashing(_)
            | Self::Storage(_)
            | Self::Serialization(_) => ErrorCode::Internal,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// An event sink could not accept an event.
#[derive(Debug, Error)]
#[error("event sink unavailable: {0}")]
pub struct SinkError(pub String);
