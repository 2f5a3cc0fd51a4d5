//! Transport seams for the cache and runtime.

use crate::error::CacheResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tollgate_types::{EntitlementDecision, EntitlementEvent, Topic};

/// Where authoritative entitlement decisions come from.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Revalidates `token` against the authoritative license.
    ///
    /// Errors must be `Invalid`, `Expired` or `Transient`.
    async fn revalidate(&self, token: &str) -> CacheResult<EntitlementDecision>;
}

/// An open hub subscription.
pub struct HubConnection {
    /// Head sequence of the topic at subscribe time.
    pub head_sequence: u64,
    /// The hub saw the subscriber behind the head.
    pub resync_required: bool,
    /// Pushed events. Ends when the connection drops.
    pub events: BoxStream<'static, EntitlementEvent>,
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("head_sequence", &self.head_sequence)
            .field("resync_required", &self.resync_required)
            .finish_non_exhaustive()
    }
}

/// Opens hub subscriptions.
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(
        &self,
        topic: &Topic,
        token: &str,
        last_known_sequence: Option<u64>,
    ) -> CacheResult<HubConnection>;
}
