//! Shared server state.

use crate::config::ServerConfig;
use std::sync::Arc;
use tollgate_credential::CredentialCodec;
use tollgate_guard::AccessGuard;
use tollgate_hub::SyncHub;
use tollgate_store::{EntitlementStore, LicenseBackend, StoreConfig};
use tollgate_types::{Clock, SystemClock};

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EntitlementStore>,
    pub guard: Arc<AccessGuard>,
    pub hub: Arc<SyncHub>,
    pub config: Arc<ServerConfig>,
    admin_key: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<EntitlementStore>,
        guard: Arc<AccessGuard>,
        hub: Arc<SyncHub>,
        config: ServerConfig,
        admin_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            store,
            guard,
            hub,
            config: Arc::new(config),
            admin_key: admin_key.into(),
        }
    }

    /// Wires a store publishing into a fresh hub, and a guard over it.
    pub fn assemble(
        backend: Arc<dyn LicenseBackend>,
        codec: CredentialCodec,
        store_config: StoreConfig,
        config: ServerConfig,
        admin_key: impl Into<Arc<str>>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hub = Arc::new(SyncHub::with_clock(config.hub.clone(), clock.clone()));
        let store = Arc::new(EntitlementStore::with_parts(
            backend,
            hub.clone(),
            clock,
            store_config,
        ));
        let guard = Arc::new(
            AccessGuard::new(store.clone(), codec, config.guard.clone())
                .with_origin_policy(config.origin.clone()),
        );
        Self::new(store, guard, hub, config, admin_key)
    }

    /// Checks a presented admin key. An empty configured key admits nobody.
    pub fn is_admin_key(&self, presented: &str) -> bool {
        !self.admin_key.is_empty() && constant_time_eq(self.admin_key.as_bytes(), presented.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
