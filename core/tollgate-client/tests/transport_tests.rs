//! TCP hub connector and device fingerprint tests.

mod common;

use common::stack;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tollgate_client::{CacheError, ClientFingerprint, HubConnector, TcpHubConnector};
use tollgate_types::{ClientId, EntitlementEventKind, Plan, Topic};

async fn start_hub(stack: &common::Stack) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tollgate_hub::serve(
        listener,
        stack.hub.clone(),
        stack.guard.codec().to_verifier(),
    ));
    addr.to_string()
}

#[tokio::test]
async fn tcp_connector_streams_pushed_events() {
    let stack = stack();
    let token = stack.login("u1", "c1", Plan::Premium).await;
    let addr = start_hub(&stack).await;

    let connector = TcpHubConnector::new(addr);
    let topic = Topic::plan(Plan::Premium);
    let mut connection = connector.connect(&topic, &token, Some(1)).await.unwrap();
    assert_eq!(connection.head_sequence, 2);
    assert!(connection.resync_required);

    stack.store.revoke(&ClientId::from("c1")).unwrap();
    let event = timeout(Duration::from_secs(5), connection.events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.sequence, 3);
    assert!(matches!(event.kind, EntitlementEventKind::Revoked { .. }));
}

#[tokio::test]
async fn tcp_connector_maps_rejected_token_to_invalid() {
    let stack = stack();
    let token = stack.login("u1", "c1", Plan::Premium).await;
    let addr = start_hub(&stack).await;

    let mut forged = token;
    forged.push('x');
    let err = TcpHubConnector::new(addr)
        .connect(&Topic::plan(Plan::Premium), &forged, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Invalid(_)), "{err:?}");
}

#[tokio::test]
async fn tcp_connector_reports_unreachable_hub_as_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = TcpHubConnector::new(addr.to_string())
        .connect(&Topic::plan(Plan::Free), "token", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Transient(_)));
}

#[test]
fn fingerprint_is_stable_per_device() {
    let first = ClientFingerprint::generate();
    let second = ClientFingerprint::generate();
    assert_eq!(first, second);
    assert!(first.matches_current());
    // 16 bytes, base64url without padding.
    assert_eq!(first.id().len(), 22);
}

#[test]
fn fingerprint_depends_on_every_component() {
    let base = ClientFingerprint::from_components(&["linux", "x86_64", "host-a", "alice"]);
    let other_host = ClientFingerprint::from_components(&["linux", "x86_64", "host-b", "alice"]);
    let other_user = ClientFingerprint::from_components(&["linux", "x86_64", "host-a", "bob"]);
    assert_ne!(base, other_host);
    assert_ne!(base, other_user);
    assert_eq!(
        base,
        ClientFingerprint::from_components(&["linux", "x86_64", "host-a", "alice"])
    );
    assert_eq!(base.to_string(), base.id());
}
