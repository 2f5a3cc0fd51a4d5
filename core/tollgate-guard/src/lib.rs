//! Access guard for Tollgate.
//!
//! The guard sits in front of credential issuance. An authentication
//! attempt passes, in order: the address block list, the per-identity
//! attempt ceiling, the origin policy, and finally the secret check. Attempts
//! are counted when their handle is acquired, before the secret is checked,
//! so cancelling a request never bypasses throttling.
//!
//! Successful attempts produce a [`Session`](tollgate_types::Session) whose
//! permissions are snapshotted from the license and signed into its token.

mod attempts;
mod audit;
mod config;
mod error;
mod guard;
mod sessions;

pub use attempts::{AttemptHandle, AttemptRecord, AttemptTracker, BlockList};
pub use audit::{AuditSink, ChannelAuditSink, SecurityEvent, SecurityEventKind, TracingAuditSink};
pub use config::{GuardConfig, OriginPolicy};
pub use error::{AuthError, AuthResult, RevalidateError, RevalidateResult};
pub use guard::{AccessGuard, AuthRequest};
pub use sessions::SessionRegistry;
