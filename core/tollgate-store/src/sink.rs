//! Where the store sends entitlement events.

use crate::error::SinkError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tollgate_types::{EntitlementEvent, EntitlementEventKind, Topic};

/// Receives one event per successful store mutation.
///
/// Implementations assign the per-topic sequence number. `publish` must not
/// block on subscribers.
pub trait EventSink: Send + Sync {
    /// Publishes `kind` on `topic`, returning the assigned sequence.
    fn publish(&self, topic: &Topic, kind: EntitlementEventKind) -> Result<u64, SinkError>;

    /// The last sequence assigned on `topic` (0 if none).
    fn head_sequence(&self, topic: &Topic) -> u64;
}

/// Discards every event. Sequences stay at 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _topic: &Topic, _kind: EntitlementEventKind) -> Result<u64, SinkError> {
        Ok(0)
    }

    fn head_sequence(&self, _topic: &Topic) -> u64 {
        0
    }
}

/// Keeps every event in memory. Useful for tests and audits of the
/// mutation path.
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<EntitlementEvent>,
    heads: HashMap<Topic, u64>,
    fail_next: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publishes fail.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Returns every event recorded so far.
    pub fn events(&self) -> Vec<EntitlementEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, topic: &Topic, kind: EntitlementEventKind) -> Result<u64, SinkError> {
        let mut state = self.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError("injected failure".to_string()));
        }
        let head = state.heads.entry(topic.clone()).or_insert(0);
        *head += 1;
        let sequence = *head;
        state.events.push(EntitlementEvent {
            topic: topic.clone(),
            sequence,
            emitted_at: Utc::now(),
            kind,
        });
        Ok(sequence)
    }

    fn head_sequence(&self, topic: &Topic) -> u64 {
        self.lock().heads.get(topic).copied().unwrap_or(0)
    }
}
