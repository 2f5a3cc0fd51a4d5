mod common;

use common::{fast_config, t0};
use std::sync::Arc;
use tempfile::TempDir;
use tollgate_store::{EntitlementStore, LicenseBackend, NoopSink, SqliteBackend};
use tollgate_types::{ClientId, LicenseStatus, ManualClock, Plan};

fn open(dir: &TempDir) -> EntitlementStore {
    let backend = SqliteBackend::open(dir.path().join("licenses.db")).unwrap();
    EntitlementStore::with_parts(
        Arc::new(backend),
        Arc::new(NoopSink),
        Arc::new(ManualClock::new(t0())),
        fast_config(),
    )
}

#[test]
fn licenses_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let client = ClientId::from("acme-1");
    {
        let store = open(&dir);
        store.create_license(client.clone(), Plan::Premium).unwrap();
        store.activate(&client).unwrap();
        store.record_usage(&client, 7).unwrap();
        store.register_identity("alice", "pw", &client).unwrap();
    }

    let store = open(&dir);
    let license = store.get(&client).unwrap();
    assert_eq!(license.status, LicenseStatus::Active);
    assert_eq!(license.usage.count, 7);
    assert_eq!(license.revision, 2);
    assert_eq!(store.verify_identity("alice", "pw").unwrap(), Some(client));
}

#[test]
fn compare_and_swap_rejects_stale_revision() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let license = tollgate_types::License::new(ClientId::from("a"), Plan::Basic, None, t0(), 0);

    assert!(backend.compare_and_swap(None, &license).unwrap());
    assert!(!backend.compare_and_swap(None, &license).unwrap());

    let mut next = license.clone();
    next.revision = 1;
    assert!(backend.compare_and_swap(Some(0), &next).unwrap());
    // A writer still holding revision 0 loses.
    assert!(!backend.compare_and_swap(Some(0), &next).unwrap());
    assert_eq!(backend.load(&ClientId::from("a")).unwrap().unwrap().revision, 1);
}

#[test]
fn two_stores_on_one_file_linearize() {
    let dir = TempDir::new().unwrap();
    let a = open(&dir);
    let b = open(&dir);
    let client = ClientId::from("free-1");
    a.create_license(client.clone(), Plan::Free).unwrap();
    b.activate(&client).unwrap();

    for i in 0..50 {
        let store = if i % 2 == 0 { &a } else { &b };
        store.record_usage(&client, 1).unwrap();
    }
    assert_eq!(a.get(&client).unwrap().usage.count, 50);
    assert_eq!(b.get(&client).unwrap().revision, 51);
}

#[test]
fn list_is_ordered_by_client() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let store = EntitlementStore::new(Arc::new(backend));
    for client in ["charlie", "alpha", "bravo"] {
        store.create_license(client, Plan::Free).unwrap();
    }
    let ids: Vec<_> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|l| l.client_id.to_string())
        .collect();
    assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);
}
