mod common;

use common::harness;
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tollgate_store::{NewLicense, StoreError};
use tollgate_types::{ClientId, LicenseStatus, Plan};

// ── Linearizability ──────────────────────────────────────────────

#[test]
fn concurrent_usage_never_exceeds_ceiling() {
    let h = harness();
    let client = ClientId::from("free-1");
    h.store.create_license(client.clone(), Plan::Free).unwrap();
    h.store.activate(&client).unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = h.store.clone();
            let barrier = barrier.clone();
            let client = client.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut granted = 0u64;
                for _ in 0..30 {
                    if store.record_usage(&client, 1).is_ok() {
                        granted += 1;
                    }
                }
                granted
            })
        })
        .collect();

    let granted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 100);
    assert_eq!(h.store.get(&client).unwrap().usage.count, 100);
}

#[test]
fn revoke_racing_extend_ends_revoked() {
    for _ in 0..20 {
        let h = harness();
        let client = ClientId::from("acme-1");
        h.store.create_license(client.clone(), Plan::Basic).unwrap();
        h.store.activate(&client).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let extender = {
            let (store, barrier, client) = (h.store.clone(), barrier.clone(), client.clone());
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    match store.extend(&client) {
                        Ok(_) | Err(StoreError::Revoked(_)) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        };
        let revoker = {
            let (store, barrier, client) = (h.store.clone(), barrier.clone(), client.clone());
            thread::spawn(move || {
                barrier.wait();
                store.revoke(&client).unwrap();
            })
        };
        extender.join().unwrap();
        revoker.join().unwrap();

        let license = h.store.get(&client).unwrap();
        assert_eq!(license.status, LicenseStatus::Revoked);

        // Events form one total order with no mutation after the revoke.
        let events = h.sink.events();
        assert_eq!(events.last().map(|e| e.kind.name()), Some("revoked"));
        assert_eq!(events.len() as u64, license.revision + 1);
    }
}

#[test]
fn revisions_increase_by_one_per_event() {
    let h = harness();
    let client = ClientId::from("acme-1");
    h.store.create_license(client.clone(), Plan::Premium).unwrap();
    h.store.activate(&client).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (store, client) = (h.store.clone(), client.clone());
            thread::spawn(move || {
                for _ in 0..25 {
                    store.record_usage(&client, 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = h.sink.events();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=102).collect();
    assert_eq!(sequences, expected);
    assert_eq!(h.store.get(&client).unwrap().revision, 101);
}

#[test]
fn racing_registrations_of_one_identity_create_one_license() {
    let h = harness();
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let (store, barrier) = (h.store.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                store.register("dana", "pw", NewLicense::new(format!("dana-{i}"), Plan::Basic))
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::IdentityExists(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.store.list().unwrap().len(), 1);
    let bound = h.store.verify_identity("dana", "pw").unwrap().unwrap();
    assert_eq!(h.store.list().unwrap()[0].client_id, bound);
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn usage_total_matches_accepted_deltas(deltas in prop::collection::vec(0u64..40, 1..30)) {
        let h = harness();
        let client = ClientId::from("free-1");
        h.store.create_license(client.clone(), Plan::Free).unwrap();
        h.store.activate(&client).unwrap();

        let mut expected = 0u64;
        for delta in deltas {
            match h.store.record_usage(&client, delta) {
                Ok(usage) => {
                    expected += delta;
                    prop_assert_eq!(usage.count, expected);
                }
                Err(StoreError::LimitExceeded { used, requested, ceiling }) => {
                    prop_assert_eq!(used, expected);
                    prop_assert!(used + requested > ceiling);
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
            prop_assert!(expected <= 100);
        }
    }
}
