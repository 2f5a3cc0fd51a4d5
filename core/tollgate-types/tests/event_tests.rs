use chrono::{Duration, TimeZone, Utc};
use tollgate_types::{
    Clock, ClientId, EntitlementEvent, EntitlementEventKind, ErrorCode, License, ManualClock,
    Plan, Topic,
};

fn sample_license() -> License {
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    License::new(ClientId::from("c1"), Plan::Premium, None, t0, 0)
}

#[test]
fn event_json_is_tagged_by_type() {
    let event = EntitlementEvent {
        topic: Topic::plan(Plan::Premium),
        sequence: 5,
        emitted_at: Utc::now(),
        kind: EntitlementEventKind::Revoked {
            client_id: ClientId::from("c1"),
            generation: 0,
            revoked_at: Utc::now(),
        },
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "revoked");
    assert_eq!(value["sequence"], 5);
    assert_eq!(value["topic"], "plan:premium");

    let parsed: EntitlementEvent = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn updated_event_carries_full_license() {
    let event = EntitlementEvent {
        topic: Topic::plan(Plan::Premium),
        sequence: 1,
        emitted_at: Utc::now(),
        kind: EntitlementEventKind::Updated {
            license: sample_license(),
        },
    };
    let json = serde_json::to_string(&event).unwrap();
    let parsed: EntitlementEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.kind.client_id().as_str(), "c1");
    assert_eq!(parsed.kind.name(), "updated");
}

#[test]
fn unknown_event_type_is_rejected() {
    let json = r#"{"topic":"plan:free","sequence":1,"emitted_at":"2026-01-01T00:00:00Z","type":"merged"}"#;
    assert!(serde_json::from_str::<EntitlementEvent>(json).is_err());
}

#[test]
fn manual_clock_clones_share_time() {
    let clock = ManualClock::default();
    let other = clock.clone();
    let before = clock.now();
    other.advance(Duration::minutes(5));
    assert_eq!(clock.now() - before, Duration::minutes(5));
}

#[test]
fn error_code_propagation_classes() {
    assert!(ErrorCode::Blocked.is_definitive_denial());
    assert!(ErrorCode::Invalid.is_definitive_denial());
    assert!(!ErrorCode::Expired.is_definitive_denial());
    assert!(ErrorCode::SequenceGap.is_locally_recoverable());
    assert_eq!(
        serde_json::to_string(&ErrorCode::TransientNetworkError).unwrap(),
        "\"transient_network_error\""
    );
}
