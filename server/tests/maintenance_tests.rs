use chrono::{Duration, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use pretty_assertions::assert_eq;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tollgate_credential::CredentialCodec;
use tollgate_guard::{AccessGuard, AuthRequest, GuardConfig};
use tollgate_hub::{HubConfig, SyncHub};
use tollgate_server::maintenance::{self, MaintenanceReport};
use tollgate_server::{AppState, ServerConfig};
use tollgate_store::{EntitlementStore, KdfParams, LicenseBackend, NewLicense, SqliteBackend, StoreConfig};
use tollgate_types::{Clock, ClientId, LicenseStatus, ManualClock, Plan, SourceInfo};

fn state_with(backend: Arc<dyn LicenseBackend>, clock: Arc<ManualClock>) -> AppState {
    let clock_dyn: Arc<dyn Clock> = clock;
    let hub = Arc::new(SyncHub::with_clock(HubConfig::default(), clock_dyn.clone()));
    let store = Arc::new(EntitlementStore::with_parts(
        backend,
        hub.clone(),
        clock_dyn,
        StoreConfig {
            kdf: KdfParams::insecure_fast(),
        },
    ));
    let guard = Arc::new(AccessGuard::new(
        store.clone(),
        CredentialCodec::new(SigningKey::from_bytes(&[9; 32])),
        GuardConfig::default(),
    ));
    AppState::new(store, guard, hub, ServerConfig::default(), "maintenance-admin-key")
}

fn request(identity: &str) -> AuthRequest {
    AuthRequest {
        identity: identity.to_string(),
        secret: "correct-horse".to_string(),
        fingerprint: "fp".to_string(),
        source: SourceInfo::from_address(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    }
}

#[tokio::test]
async fn sweep_expires_due_licenses_and_collects_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::open(dir.path().join("tollgate.db")).unwrap());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
    let state = state_with(backend, clock.clone());

    state
        .store
        .register("u1", "correct-horse", NewLicense::new("c1", Plan::Basic))
        .unwrap();
    state
        .guard
        .authenticate(request("u1"), std::time::Duration::from_secs(5))
        .await
        .unwrap();
    state.store.create_license("c2", Plan::Free).unwrap();
    state.store.activate(&ClientId::from("c2")).unwrap();

    assert_eq!(maintenance::run_once(&state), MaintenanceReport::default());

    clock.advance(Duration::days(31));
    let report = maintenance::run_once(&state);
    assert_eq!(
        report,
        MaintenanceReport {
            expired: 1,
            sessions_collected: 1,
        }
    );

    let basic = state.store.get(&ClientId::from("c1")).unwrap();
    assert_eq!(basic.status, LicenseStatus::Expired);
    let free = state.store.get(&ClientId::from("c2")).unwrap();
    assert_eq!(free.status, LicenseStatus::Active);

    // Already persisted; a second pass has nothing to do.
    assert_eq!(maintenance::run_once(&state), MaintenanceReport::default());
}

#[tokio::test]
async fn sweep_is_a_no_op_on_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::open(dir.path().join("empty.db")).unwrap());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = state_with(backend, clock);
    assert_eq!(maintenance::run_once(&state), MaintenanceReport::default());
}
