#![allow(dead_code)]

use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tollgate_credential::CredentialCodec;
use tollgate_hub::{serve, HubConfig, SyncHub};
use tollgate_types::{
    ClientId, EntitlementEventKind, License, Plan, Session, SessionId, SourceInfo, Topic,
};

pub fn codec() -> CredentialCodec {
    CredentialCodec::new(SigningKey::from_bytes(&[9; 32]))
}

pub fn token_for(codec: &CredentialCodec, topic: Topic) -> String {
    let now = Utc::now();
    let session = Session {
        session_id: SessionId::new(),
        client_id: ClientId::from("c1"),
        token: String::new(),
        created_at: now,
        last_activity: now,
        expires_at: now + Duration::hours(1),
        fingerprint: "fp".to_string(),
        source: SourceInfo::from_address("127.0.0.1".parse().unwrap()),
        permissions: BTreeSet::new(),
        topic,
    };
    codec.issue(&session).unwrap()
}

pub fn updated(client: &str) -> EntitlementEventKind {
    EntitlementEventKind::Updated {
        license: License::new(ClientId::from(client), Plan::Premium, None, Utc::now(), 0),
    }
}

pub async fn start_server(config: HubConfig) -> (Arc<SyncHub>, SocketAddr, CredentialCodec) {
    let hub = Arc::new(SyncHub::new(config));
    let codec = codec();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, hub.clone(), codec.to_verifier()));
    (hub, addr, codec)
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}
