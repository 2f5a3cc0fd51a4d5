#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tollgate_credential::CredentialCodec;
use tollgate_guard::{AccessGuard, AuthRequest, ChannelAuditSink, GuardConfig, SecurityEvent};
use tollgate_store::{
    EntitlementStore, KdfParams, MemoryBackend, NewLicense, RecordingSink, StoreConfig,
};
use tollgate_types::{ManualClock, Plan, SourceInfo};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn address() -> IpAddr {
    "1.2.3.4".parse().unwrap()
}

pub struct Harness {
    pub guard: Arc<AccessGuard>,
    pub store: Arc<EntitlementStore>,
    pub clock: ManualClock,
    pub audit: mpsc::Receiver<SecurityEvent>,
}

pub fn harness() -> Harness {
    harness_with(GuardConfig::default(), |guard| guard)
}

pub fn harness_with(
    config: GuardConfig,
    customize: impl FnOnce(AccessGuard) -> AccessGuard,
) -> Harness {
    let clock = ManualClock::new(t0());
    let store = Arc::new(EntitlementStore::with_parts(
        Arc::new(MemoryBackend::new()),
        Arc::new(RecordingSink::new()),
        Arc::new(clock.clone()),
        StoreConfig {
            kdf: KdfParams::insecure_fast(),
        },
    ));
    let codec = CredentialCodec::with_clock(SigningKey::from_bytes(&[3; 32]), Arc::new(clock.clone()));
    let (audit_sink, audit) = ChannelAuditSink::new(256);
    let guard = AccessGuard::new(store.clone(), codec, config).with_audit_sink(Arc::new(audit_sink));
    Harness {
        guard: Arc::new(customize(guard)),
        store,
        clock,
        audit,
    }
}

/// Registers `identity` with secret "correct-horse" on a pending license.
pub fn register(store: &EntitlementStore, identity: &str, client_id: &str, plan: Plan) {
    store
        .register(identity, "correct-horse", NewLicense::new(client_id, plan))
        .unwrap();
}

pub fn request(identity: &str, secret: &str) -> AuthRequest {
    AuthRequest {
        identity: identity.to_string(),
        secret: secret.to_string(),
        fingerprint: "fp-test".to_string(),
        source: SourceInfo::from_address(address()),
    }
}

pub fn drain(rx: &mut mpsc::Receiver<SecurityEvent>) -> Vec<SecurityEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
