//! Shared test helpers for credential tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use std::net::{IpAddr, Ipv4Addr};
use tollgate_types::{ClientId, Plan, Session, SessionId, SourceInfo, Topic};

/// Returns a deterministic Ed25519 signing key from a fixed seed.
pub fn test_signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(&seed)
}

/// A second, unrelated key.
pub fn other_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// A premium session created at `t0` lasting one hour.
pub fn sample_session() -> Session {
    Session {
        session_id: SessionId::new(),
        client_id: ClientId::from("c1"),
        token: String::new(),
        created_at: t0(),
        last_activity: t0(),
        expires_at: t0() + Duration::hours(1),
        fingerprint: "fp-abc".to_string(),
        source: SourceInfo::from_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
        permissions: Plan::Premium.modules(),
        topic: Topic::plan(Plan::Premium),
    }
}
