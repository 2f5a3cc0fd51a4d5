//! Authoritative entitlement store for Tollgate.
//!
//! The store is the single writer of license state. Every mutation:
//! 1. takes the per-client lock,
//! 2. reads the current record and computes the next one,
//! 3. writes it through the backend's compare-and-swap on `revision`,
//! 4. emits exactly one event to the injected [`EventSink`].
//!
//! A failed emission is logged and never rolls the write back; clients
//! reconcile by pulling.
//!
//! Backends implement the narrow [`LicenseBackend`] API. Two ship here:
//! an in-memory map and SQLite.

mod backend;
mod error;
mod locks;
mod secret;
mod sink;
mod sqlite;
mod store;

pub use backend::{IdentityRecord, LicenseBackend, MemoryBackend};
pub use error::{SinkError, StoreError, StoreResult};
pub use secret::KdfParams;
pub use sink::{EventSink, NoopSink, RecordingSink};
pub use sqlite::SqliteBackend;
pub use store::{EntitlementStore, LicenseSnapshot, NewLicense, StoreConfig, MAX_CAS_RETRIES};
