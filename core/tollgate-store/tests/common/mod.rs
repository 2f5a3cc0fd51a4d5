#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tollgate_store::{EntitlementStore, KdfParams, MemoryBackend, RecordingSink, StoreConfig};
use tollgate_types::ManualClock;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn fast_config() -> StoreConfig {
    StoreConfig {
        kdf: KdfParams::insecure_fast(),
    }
}

pub struct Harness {
    pub store: Arc<EntitlementStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: ManualClock,
}

pub fn harness() -> Harness {
    let sink = Arc::new(RecordingSink::new());
    let clock = ManualClock::new(t0());
    let store = EntitlementStore::with_parts(
        Arc::new(MemoryBackend::new()),
        sink.clone(),
        Arc::new(clock.clone()),
        fast_config(),
    );
    Harness {
        store: Arc::new(store),
        sink,
        clock,
    }
}
