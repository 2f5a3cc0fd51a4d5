#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tollgate_client::{
    CacheConfig, CacheError, CacheResult, EntitlementCache, EntitlementSource, HubConnection,
    HubConnector,
};
use tollgate_credential::CredentialCodec;
use tollgate_guard::{AccessGuard, AuthRequest, GuardConfig, RevalidateError};
use tollgate_hub::SyncHub;
use tollgate_store::{EntitlementStore, KdfParams, MemoryBackend, NewLicense, StoreConfig};
use tollgate_types::{
    ClientId, EntitlementDecision, EntitlementEvent, EntitlementEventKind, License, LicenseStatus,
    ManualClock, Plan, SourceInfo, Topic,
};

pub const SECRET: &str = "correct-horse";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Revalidates in-process against an [`AccessGuard`].
pub struct LocalGuardSource {
    guard: Arc<AccessGuard>,
    offline: AtomicBool,
    pulls: AtomicUsize,
}

impl LocalGuardSource {
    pub fn new(guard: Arc<AccessGuard>) -> Self {
        Self {
            guard,
            offline: AtomicBool::new(false),
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementSource for LocalGuardSource {
    async fn revalidate(&self, token: &str) -> CacheResult<EntitlementDecision> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Transient("source offline".to_string()));
        }
        self.guard.revalidate(token).map_err(|e| match e {
            RevalidateError::Invalid(reason) => CacheError::Invalid(reason),
            RevalidateError::Expired { expired_at } => CacheError::Expired { expired_at },
            other => CacheError::Transient(other.to_string()),
        })
    }
}

/// Subscribes in-process to a [`SyncHub`].
pub struct LocalHubConnector {
    hub: Arc<SyncHub>,
    drop_events: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    offline: AtomicBool,
    connects: AtomicUsize,
}

impl LocalHubConnector {
    pub fn new(hub: Arc<SyncHub>) -> Self {
        Self {
            hub,
            drop_events: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicUsize::new(0)),
            offline: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    /// Silently discards pushed events while set.
    pub fn set_drop_events(&self, drop_events: bool) {
        self.drop_events.store(drop_events, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of events discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Yields until at least `n` events have been discarded.
    pub async fn wait_dropped(&self, n: usize) {
        while self.dropped() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl HubConnector for LocalHubConnector {
    async fn connect(
        &self,
        topic: &Topic,
        _token: &str,
        last_known_sequence: Option<u64>,
    ) -> CacheResult<HubConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Transient("hub offline".to_string()));
        }
        let subscription = self.hub.subscribe_from(topic, last_known_sequence);
        let head_sequence = subscription.head_sequence();
        let resync_required = subscription.resync_required();
        let drop_events = self.drop_events.clone();
        let dropped = self.dropped.clone();
        let events = subscription
            .filter(move |_| {
                let keep = !drop_events.load(Ordering::SeqCst);
                if !keep {
                    dropped.fetch_add(1, Ordering::SeqCst);
                }
                futures::future::ready(keep)
            })
            .boxed();
        Ok(HubConnection {
            head_sequence,
            resync_required,
            events,
        })
    }
}

/// Accepts connects and never answers them.
#[derive(Default)]
pub struct StalledHubConnector {
    attempts: AtomicUsize,
}

impl StalledHubConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubConnector for StalledHubConnector {
    async fn connect(
        &self,
        _topic: &Topic,
        _token: &str,
        _last_known_sequence: Option<u64>,
    ) -> CacheResult<HubConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// A store publishing into a hub, and a guard over it.
pub struct Stack {
    pub store: Arc<EntitlementStore>,
    pub hub: Arc<SyncHub>,
    pub guard: Arc<AccessGuard>,
    pub clock: ManualClock,
    pub source: Arc<LocalGuardSource>,
    pub connector: Arc<LocalHubConnector>,
}

pub fn stack() -> Stack {
    let clock = ManualClock::new(t0());
    let hub = Arc::new(SyncHub::with_clock(Default::default(), Arc::new(clock.clone())));
    let store = Arc::new(EntitlementStore::with_parts(
        Arc::new(MemoryBackend::new()),
        hub.clone(),
        Arc::new(clock.clone()),
        StoreConfig {
            kdf: KdfParams::insecure_fast(),
        },
    ));
    let codec = CredentialCodec::with_clock(SigningKey::from_bytes(&[5; 32]), Arc::new(clock.clone()));
    let guard = Arc::new(AccessGuard::new(store.clone(), codec, GuardConfig::default()));
    Stack {
        source: Arc::new(LocalGuardSource::new(guard.clone())),
        connector: Arc::new(LocalHubConnector::new(hub.clone())),
        store,
        hub,
        guard,
        clock,
    }
}

impl Stack {
    /// Registers `identity` on a fresh license and logs in. Returns the token.
    pub async fn login(&self, identity: &str, client_id: &str, plan: Plan) -> String {
        self.store
            .register(identity, SECRET, NewLicense::new(client_id, plan))
            .unwrap();
        let request = AuthRequest {
            identity: identity.to_string(),
            secret: SECRET.to_string(),
            fingerprint: "fp-test".to_string(),
            source: SourceInfo::from_address("10.0.0.1".parse().unwrap()),
        };
        self.guard
            .authenticate(request, Duration::from_secs(10))
            .await
            .unwrap()
            .token
    }

    pub fn cache(&self, config: CacheConfig) -> EntitlementCache {
        EntitlementCache::new(config, self.source.clone())
            .with_verifier(self.guard.codec().clone())
            .with_clock(Arc::new(self.clock.clone()))
    }
}

/// An active premium license for `client`.
pub fn premium(client: &str) -> License {
    let mut license = License::new(ClientId::from(client), Plan::Premium, None, t0(), 0);
    license.status = LicenseStatus::Active;
    license.revision = 2;
    license
}

pub fn event(sequence: u64, kind: EntitlementEventKind) -> EntitlementEvent {
    EntitlementEvent {
        topic: Topic::plan(Plan::Premium),
        sequence,
        emitted_at: t0(),
        kind,
    }
}

/// Always answers with a fixed decision.
pub struct FixedSource {
    pub decision: EntitlementDecision,
}

impl FixedSource {
    pub fn new(license: License, sequence: u64) -> Self {
        Self {
            decision: EntitlementDecision {
                granted: true,
                reason: "active".to_string(),
                license,
                sequence,
            },
        }
    }
}

#[async_trait]
impl EntitlementSource for FixedSource {
    async fn revalidate(&self, _token: &str) -> CacheResult<EntitlementDecision> {
        Ok(self.decision.clone())
    }
}
