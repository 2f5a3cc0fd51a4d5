//! Hub wire messages.
//!
//! A subscriber opens a connection with `Subscribe`, receives `Subscribed`
//! with the topic's head sequence, then a stream of `Event` frames. Either
//! side may send `Ping`; the other answers `Pong` with the same nonce.

use serde::{Deserialize, Serialize};
use tollgate_types::{EntitlementEvent, ErrorCode, Topic};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// A hub protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubMessage {
    /// First frame from a subscriber.
    Subscribe(SubscribeMessage),

    /// Answer to `Subscribe`.
    Subscribed(SubscribedMessage),

    /// One entitlement event.
    Event(EntitlementEvent),

    /// Keepalive.
    Ping(u64),

    /// Keepalive response.
    Pong(u64),

    /// Error; the sender closes the connection after it.
    Error(ErrorMessage),
}

/// Subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    /// Protocol version.
    pub version: u32,
    pub topic: Topic,
    /// Session token; its topic claim must equal `topic`.
    pub token: String,
    /// Last sequence the subscriber applied, if any.
    #[serde(default)]
    pub last_known_sequence: Option<u64>,
}

impl SubscribeMessage {
    pub fn new(topic: Topic, token: impl Into<String>, last_known_sequence: Option<u64>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            topic,
            token: token.into(),
            last_known_sequence,
        }
    }
}

/// Subscription confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedMessage {
    pub topic: Topic,
    /// Last sequence assigned on the topic at subscribe time.
    pub head_sequence: u64,
    /// The subscriber's `last_known_sequence` is behind the head.
    pub resync_required: bool,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
