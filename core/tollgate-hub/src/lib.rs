//! Synchronization hub for Tollgate.
//!
//! The hub fans entitlement events out to subscribers of a topic. It
//! assigns every event a per-topic sequence, strictly increasing from 1,
//! and keeps no history: a subscriber that falls behind is told so and
//! reconciles by pulling from the guard.
//!
//! Each subscriber owns a bounded queue. Publishing never waits; a full
//! queue disconnects that subscriber.
//!
//! [`serve`] exposes the hub over TCP using length-prefixed JSON frames.

pub mod codec;
mod error;
mod hub;
pub mod protocol;
mod server;

pub use error::{HubError, HubResult};
pub use hub::{HubConfig, Subscription, SyncHub};
pub use protocol::{HubMessage, PROTOCOL_VERSION};
pub use server::serve;
