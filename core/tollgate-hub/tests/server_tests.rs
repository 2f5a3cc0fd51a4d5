mod common;

use common::{connect, start_server, token_for, updated};
use std::time::Duration;
use tollgate_hub::codec::{read_frame, write_frame, MAX_FRAME_SIZE};
use tollgate_hub::protocol::SubscribeMessage;
use tollgate_hub::{HubConfig, HubError, HubMessage};
use tollgate_types::{ErrorCode, Plan, Topic};
use tokio::io::AsyncWriteExt;

fn premium() -> Topic {
    Topic::plan(Plan::Premium)
}

async fn subscribe(
    stream: &mut tokio::net::TcpStream,
    topic: Topic,
    token: String,
    last_known: Option<u64>,
) -> HubMessage {
    let request = HubMessage::Subscribe(SubscribeMessage::new(topic, token, last_known));
    write_frame(stream, &request).await.unwrap();
    read_frame(stream).await.unwrap()
}

// ── Handshake ────────────────────────────────────────────────────

#[tokio::test]
async fn valid_token_subscribes_and_streams_events() {
    let (hub, addr, codec) = start_server(HubConfig::default()).await;
    hub.publish(&premium(), updated("c1"));

    let mut stream = connect(addr).await;
    let reply = subscribe(&mut stream, premium(), token_for(&codec, premium()), Some(0)).await;
    match reply {
        HubMessage::Subscribed(subscribed) => {
            assert_eq!(subscribed.head_sequence, 1);
            assert!(subscribed.resync_required);
        }
        other => panic!("expected Subscribed, got {other:?}"),
    }

    hub.publish(&premium(), updated("c1"));
    match read_frame(&mut stream).await.unwrap() {
        HubMessage::Event(event) => assert_eq!(event.sequence, 2),
        other => panic!("expected Event, got {other:?}"),
    }
}

#[tokio::test]
async fn token_for_other_topic_is_refused() {
    let (_hub, addr, codec) = start_server(HubConfig::default()).await;
    let mut stream = connect(addr).await;
    let token = token_for(&codec, Topic::plan(Plan::Basic));

    match subscribe(&mut stream, premium(), token, None).await {
        HubMessage::Error(error) => assert_eq!(error.code, ErrorCode::PolicyDenied),
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(matches!(read_frame(&mut stream).await, Err(HubError::Closed)));
}

#[tokio::test]
async fn garbage_token_is_invalid() {
    let (_hub, addr, _codec) = start_server(HubConfig::default()).await;
    let mut stream = connect(addr).await;
    match subscribe(&mut stream, premium(), "garbage".to_string(), None).await {
        HubMessage::Error(error) => assert_eq!(error.code, ErrorCode::Invalid),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn first_frame_must_be_subscribe() {
    let (_hub, addr, _codec) = start_server(HubConfig::default()).await;
    let mut stream = connect(addr).await;
    write_frame(&mut stream, &HubMessage::Ping(1)).await.unwrap();
    assert!(matches!(read_frame(&mut stream).await.unwrap(), HubMessage::Error(_)));
}

#[tokio::test]
async fn silent_connection_times_out() {
    let config = HubConfig {
        handshake_timeout_ms: 50,
        ..HubConfig::default()
    };
    let (_hub, addr, _codec) = start_server(config).await;
    let mut stream = connect(addr).await;
    let result = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream)).await;
    assert!(matches!(result, Ok(Err(HubError::Closed))));
}

// ── Session ──────────────────────────────────────────────────────

#[tokio::test]
async fn ping_is_answered() {
    let (_hub, addr, codec) = start_server(HubConfig::default()).await;
    let mut stream = connect(addr).await;
    subscribe(&mut stream, premium(), token_for(&codec, premium()), None).await;

    write_frame(&mut stream, &HubMessage::Ping(42)).await.unwrap();
    assert_eq!(read_frame(&mut stream).await.unwrap(), HubMessage::Pong(42));
}

#[tokio::test]
async fn oversized_frame_is_rejected_by_reader() {
    let (mut client, mut server) = tokio::io::duplex(64);
    let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
    client.write_all(&len).await.unwrap();
    assert!(matches!(read_frame(&mut server).await, Err(HubError::FrameTooLarge(_))));
}
