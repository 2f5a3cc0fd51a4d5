//! Security event reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Outcome category of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    Success,
    Failure,
    Blocked,
}

/// One audited authentication decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub identity: String,
    pub address: IpAddr,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Receives security events. Must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Writes security events as log records under the `tollgate::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        match event.kind {
            SecurityEventKind::Success => info!(
                target: "tollgate::audit",
                identity = %event.identity,
                address = %event.address,
                reason = %event.reason,
                "authentication succeeded"
            ),
            SecurityEventKind::Failure => warn!(
                target: "tollgate::audit",
                identity = %event.identity,
                address = %event.address,
                reason = %event.reason,
                "authentication failed"
            ),
            SecurityEventKind::Blocked => warn!(
                target: "tollgate::audit",
                identity = %event.identity,
                address = %event.address,
                reason = %event.reason,
                "authentication blocked"
            ),
        }
    }
}

/// Forwards security events to a bounded channel. Events are dropped when
/// the channel is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<SecurityEvent>,
}

impl ChannelAuditSink {
    /// Creates a sink and the receiver draining it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: SecurityEvent) {
        let _ = self.tx.try_send(event);
    }
}
