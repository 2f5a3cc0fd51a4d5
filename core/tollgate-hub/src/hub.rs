//! In-process topic fan-out.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tollgate_store::{EventSink, SinkError};
use tollgate_types::{Clock, EntitlementEvent, EntitlementEventKind, SystemClock, Topic};
use tracing::{debug, warn};

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Queue depth per subscriber.
    pub subscriber_buffer: usize,
    /// How long a TCP subscriber has to send its `Subscribe` frame (ms).
    pub handshake_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            handshake_timeout_ms: 10_000,
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<EntitlementEvent>,
}

#[derive(Default)]
struct TopicState {
    head: u64,
    subscribers: Vec<Subscriber>,
}

/// Publishes entitlement events to topic subscribers.
pub struct SyncHub {
    topics: Mutex<HashMap<Topic, TopicState>>,
    next_subscriber: AtomicU64,
    config: HubConfig,
    clock: Arc<dyn Clock>,
}

impl SyncHub {
    pub fn new(config: HubConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: HubConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(1),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, TopicState>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to `topic` from its current head.
    pub fn subscribe(&self, topic: &Topic) -> Subscription {
        self.subscribe_from(topic, None)
    }

    /// Subscribes to `topic`. `resync_required` is set when `last_known` is
    /// behind the head; the missed events are not replayed.
    pub fn subscribe_from(&self, topic: &Topic, last_known: Option<u64>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.lock();
        let state = topics.entry(topic.clone()).or_default();
        state.subscribers.push(Subscriber { id, tx });
        let head_sequence = state.head;
        drop(topics);

        let resync_required = last_known.is_some_and(|seen| seen < head_sequence);
        debug!(topic = %topic, subscriber = id, head_sequence, resync_required, "subscribed");
        Subscription {
            topic: topic.clone(),
            head_sequence,
            resync_required,
            rx,
        }
    }

    /// Publishes `kind` on `topic` and returns its sequence.
    ///
    /// Never waits. A subscriber whose queue is full is disconnected.
    pub fn publish(&self, topic: &Topic, kind: EntitlementEventKind) -> u64 {
        let mut topics = self.lock();
        let state = topics.entry(topic.clone()).or_default();
        state.head += 1;
        let event = EntitlementEvent {
            topic: topic.clone(),
            sequence: state.head,
            emitted_at: self.clock.now(),
            kind,
        };

        state.subscribers.retain(|subscriber| match subscriber.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(topic = %topic, subscriber = subscriber.id, "subscriber queue full, disconnecting");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        debug!(
            topic = %topic,
            sequence = event.sequence,
            kind = event.kind.name(),
            subscribers = state.subscribers.len(),
            "published"
        );
        event.sequence
    }

    /// Last sequence assigned on `topic` (0 if none).
    pub fn head_sequence(&self, topic: &Topic) -> u64 {
        self.lock().get(topic).map_or(0, |state| state.head)
    }

    /// Number of connected subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.lock().get(topic).map_or(0, |state| {
            state
                .subscribers
                .iter()
                .filter(|subscriber| !subscriber.tx.is_closed())
                .count()
        })
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl EventSink for SyncHub {
    fn publish(&self, topic: &Topic, kind: EntitlementEventKind) -> Result<u64, SinkError> {
        Ok(SyncHub::publish(self, topic, kind))
    }

    fn head_sequence(&self, topic: &Topic) -> u64 {
        SyncHub::head_sequence(self, topic)
    }
}

/// A live subscription. Ends when the hub disconnects the subscriber.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    head_sequence: u64,
    resync_required: bool,
    rx: mpsc::Receiver<EntitlementEvent>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Head sequence of the topic when the subscription was opened.
    pub fn head_sequence(&self) -> u64 {
        self.head_sequence
    }

    pub fn resync_required(&self) -> bool {
        self.resync_required
    }

    /// Receives the next event; `None` once disconnected and drained.
    pub async fn recv(&mut self) -> Option<EntitlementEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = EntitlementEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
