//! Client-side entitlement enforcement for Tollgate.
//!
//! The [`EntitlementCache`] holds the last authoritative license this client
//! pulled and gates modules by its age:
//!
//! - `Allowed` while the snapshot is fresh,
//! - `AllowedStale` once it passes `fresh_for` but not the staleness bound,
//! - `Denied` beyond the bound, when unbootstrapped, or when the license
//!   does not grant the module.
//!
//! Pushed hub events update the cache in sequence order; a gap forces a
//! pull. Periodic revalidation is the backstop: a client whose push channel
//! is silent still converges within one interval.
//!
//! [`EntitlementClient`] runs the cache in a single task that owns the hub
//! connection and publishes a [`watch`](tokio::sync::watch) view.

mod cache;
mod config;
mod error;
mod fingerprint;
#[cfg(feature = "online")]
mod http;
mod runtime;
mod source;
mod tcp;

pub use cache::{gate, ApplyOutcome, ClientEntitlementSnapshot, EntitlementCache, ModuleGate};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use fingerprint::ClientFingerprint;
#[cfg(feature = "online")]
pub use http::HttpEntitlementSource;
pub use runtime::{Backoff, ConnectionState, EntitlementClient, EntitlementHandle, EntitlementView};
pub use source::{EntitlementSource, HubConnection, HubConnector};
pub use tcp::TcpHubConnector;
