//! Core type definitions for Tollgate.
//!
//! This crate defines the types shared by every other crate in the
//! workspace:
//! - Client, session, module and topic identifiers
//! - The plan catalog and the authoritative `License` record
//! - Sessions and the network origin they were created from
//! - Tagged entitlement events published by the hub
//! - The entitlement decision returned to clients
//! - An injectable `Clock`
//!
//! Nothing here performs I/O.

mod clock;
mod decision;
mod error;
mod event;
mod ids;
mod license;
mod plan;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::EntitlementDecision;
pub use error::ErrorCode;
pub use event::{EntitlementEvent, EntitlementEventKind};
pub use ids::{ClientId, ModuleId, SessionId, Topic};
pub use license::{License, LicenseStatus, Usage, USAGE_CYCLE_SECS};
pub use plan::Plan;
pub use session::{Session, SourceInfo};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}
