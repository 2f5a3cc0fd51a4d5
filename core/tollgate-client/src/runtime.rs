//! The entitlement client runtime.
//!
//! One task owns the [`EntitlementCache`] and the hub connection. It moves
//! through `Disconnected → Connecting → Subscribed`, and through `Resyncing`
//! whenever it must pull: after every (re)subscription and on a sequence
//! gap. A revalidation interval runs regardless of push traffic, and a failed
//! pull is retried with backoff ahead of the next interval.
//!
//! Hub connects run as their own `select!` branch under a deadline, so a hub
//! that never answers cannot hold up pulls or commands.

use crate::cache::{gate, ClientEntitlementSnapshot, EntitlementCache, ModuleGate};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::source::{HubConnection, HubConnector};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tollgate_types::{Clock, EntitlementEvent, ModuleId};
use tracing::{debug, info, warn};

/// Hub connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Resyncing,
}

/// What readers observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementView {
    pub state: ConnectionState,
    pub snapshot: Option<ClientEntitlementSnapshot>,
    pub reconcile_pending: bool,
}

/// Capped exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Returns the next delay and doubles the following one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

enum Command {
    Revalidate(oneshot::Sender<CacheResult<()>>),
    Bootstrap(String, oneshot::Sender<CacheResult<ClientEntitlementSnapshot>>),
    ReplaceToken(String),
}

/// Cloneable handle to a running [`EntitlementClient`].
#[derive(Clone)]
pub struct EntitlementHandle {
    view: watch::Receiver<EntitlementView>,
    commands: mpsc::Sender<Command>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl EntitlementHandle {
    /// The current view.
    pub fn view(&self) -> EntitlementView {
        self.view.borrow().clone()
    }

    /// A receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<EntitlementView> {
        self.view.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.view.borrow().state
    }

    pub fn gate(&self, module: &ModuleId) -> ModuleGate {
        let view = self.view.borrow();
        gate(view.snapshot.as_ref(), module, self.clock.now(), &self.config)
    }

    pub fn is_module_allowed(&self, module: &ModuleId) -> bool {
        self.gate(module).is_allowed()
    }

    /// Forces an authoritative pull and waits for its result.
    pub async fn revalidate(&self) -> CacheResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Revalidate(tx)).await?;
        rx.await.map_err(|_| closed())?
    }

    /// Pulls for `token` and (re)subscribes with it.
    pub async fn bootstrap(&self, token: impl Into<String>) -> CacheResult<ClientEntitlementSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Bootstrap(token.into(), tx)).await?;
        rx.await.map_err(|_| closed())?
    }

    /// Uses `token` for future pulls and subscriptions.
    pub async fn replace_token(&self, token: impl Into<String>) -> CacheResult<()> {
        self.send(Command::ReplaceToken(token.into())).await
    }

    async fn send(&self, command: Command) -> CacheResult<()> {
        self.commands.send(command).await.map_err(|_| closed())
    }
}

fn closed() -> CacheError {
    CacheError::Transient("entitlement client stopped".to_string())
}

/// Owns the cache and the hub connection.
pub struct EntitlementClient {
    cache: EntitlementCache,
    connector: Arc<dyn HubConnector>,
    view: watch::Sender<EntitlementView>,
    commands: mpsc::Receiver<Command>,
    state: ConnectionState,
    backoff: Backoff,
    pull_backoff: Backoff,
    pull_retry_at: Option<Instant>,
}

type PendingConnect = BoxFuture<'static, CacheResult<HubConnection>>;

impl EntitlementClient {
    /// Starts the runtime. It stops when every handle has been dropped.
    pub fn spawn(
        cache: EntitlementCache,
        connector: Arc<dyn HubConnector>,
    ) -> (EntitlementHandle, JoinHandle<()>) {
        let config = cache.config().clone();
        let clock = cache.clock().clone();
        let initial = EntitlementView {
            state: ConnectionState::Disconnected,
            snapshot: cache.snapshot().cloned(),
            reconcile_pending: cache.reconcile_pending(),
        };
        let (view_tx, view_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(16);

        let backoff = Backoff::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        );
        let client = Self {
            pull_backoff: backoff.clone(),
            pull_retry_at: None,
            backoff,
            cache,
            connector,
            view: view_tx,
            commands: command_rx,
            state: ConnectionState::Disconnected,
        };
        let task = tokio::spawn(client.run());
        let handle = EntitlementHandle {
            view: view_rx,
            commands: command_tx,
            config,
            clock,
        };
        (handle, task)
    }

    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.cache.config().revalidate_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        let mut events: Option<BoxStream<'static, EntitlementEvent>> = None;
        let mut connecting: Option<PendingConnect> = None;
        let mut retry_at = Some(Instant::now());

        loop {
            self.publish();
            let idle = Instant::now() + Duration::from_secs(3600);
            let connect_at = retry_at.unwrap_or(idle);
            let can_connect = events.is_none()
                && connecting.is_none()
                && retry_at.is_some()
                && self.cache.snapshot().is_some();
            let pull_at = self.pull_retry_at;

            tokio::select! {
                _ = tokio::time::sleep_until(connect_at), if can_connect => {
                    retry_at = None;
                    connecting = self.start_connect();
                }
                result = next_connection(&mut connecting) => {
                    connecting = None;
                    events = self.connected(result).await;
                    if events.is_none() && self.cache.snapshot().is_some() {
                        retry_at = Some(Instant::now() + self.backoff.next_delay());
                    }
                }
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        if let Err(CacheError::SequenceGap { .. }) = self.cache.apply_event(&event) {
                            self.resync().await;
                        }
                        if self.purged() {
                            events = None;
                        }
                    }
                    None => {
                        info!("hub connection lost");
                        events = None;
                        self.state = ConnectionState::Disconnected;
                        retry_at = Some(Instant::now() + self.backoff.next_delay());
                    }
                },
                _ = interval.tick() => {
                    let _ = self.revalidate().await;
                    if self.purged() {
                        events = None;
                        connecting = None;
                        retry_at = None;
                    }
                }
                _ = tokio::time::sleep_until(pull_at.unwrap_or(idle)), if pull_at.is_some() => {
                    debug!("retrying failed pull");
                    let _ = self.revalidate().await;
                    if self.purged() {
                        events = None;
                        connecting = None;
                        retry_at = None;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Revalidate(reply)) => {
                        let result = self.revalidate().await;
                        if self.purged() {
                            events = None;
                            connecting = None;
                            retry_at = None;
                        }
                        self.publish();
                        let _ = reply.send(result);
                    }
                    Some(Command::Bootstrap(token, reply)) => {
                        let result = self.cache.bootstrap(&token).await;
                        // Resubscribe with the new token.
                        events = None;
                        connecting = None;
                        self.state = ConnectionState::Disconnected;
                        self.backoff.reset();
                        if result.is_ok() {
                            self.pull_backoff.reset();
                            self.pull_retry_at = None;
                        }
                        retry_at = result.is_ok().then(Instant::now);
                        self.publish();
                        let _ = reply.send(result);
                    }
                    Some(Command::ReplaceToken(token)) => {
                        self.cache.replace_token(token);
                        events = None;
                        connecting = None;
                        self.state = ConnectionState::Disconnected;
                        retry_at = Some(Instant::now());
                    }
                    None => {
                        debug!("all handles dropped, stopping entitlement client");
                        break;
                    }
                },
            }
        }
    }

    /// Starts a subscription for the current snapshot's topic. The returned
    /// future owns its inputs and fails as transient once the connect
    /// timeout elapses.
    fn start_connect(&mut self) -> Option<PendingConnect> {
        let snapshot = self.cache.snapshot()?;
        let topic = snapshot.license.topic();
        let token = snapshot.token.clone();
        let last_known = snapshot.last_sequence_seen;
        let connector = self.connector.clone();
        let deadline = self.cache.config().connect_timeout();

        self.state = ConnectionState::Connecting;
        self.publish();
        debug!(topic = %topic, last_known, "connecting to hub");
        Some(
            async move {
                match tokio::time::timeout(deadline, connector.connect(&topic, &token, Some(last_known)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::Transient("hub connect timed out".to_string())),
                }
            }
            .boxed(),
        )
    }

    /// Handles a finished connect: on success pulls to cover anything missed
    /// while disconnected.
    async fn connected(
        &mut self,
        result: CacheResult<HubConnection>,
    ) -> Option<BoxStream<'static, EntitlementEvent>> {
        match result {
            Ok(connection) => {
                debug!(
                    head = connection.head_sequence,
                    resync_required = connection.resync_required,
                    "subscribed"
                );
                self.backoff.reset();
                self.resync().await;
                if self.cache.snapshot().is_none() {
                    return None;
                }
                Some(connection.events)
            }
            Err(CacheError::Invalid(reason)) => {
                warn!(%reason, "hub refused credential, purging entitlements");
                self.cache.purge();
                self.pull_retry_at = None;
                self.state = ConnectionState::Disconnected;
                None
            }
            Err(e) => {
                debug!("hub connect failed: {e}");
                self.state = ConnectionState::Disconnected;
                None
            }
        }
    }

    /// True once the cache has been purged; the connection must go too.
    fn purged(&mut self) -> bool {
        if self.cache.snapshot().is_some() {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        true
    }

    async fn resync(&mut self) {
        self.state = ConnectionState::Resyncing;
        self.publish();
        let _ = self.revalidate().await;
        self.state = if self.cache.snapshot().is_some() {
            ConnectionState::Subscribed
        } else {
            ConnectionState::Disconnected
        };
    }

    /// Pulls once. A transient failure, or any failure while a reconcile is
    /// pending, schedules a retry on the pull backoff.
    async fn revalidate(&mut self) -> CacheResult<()> {
        let result = self.cache.periodic_revalidate().await;
        match &result {
            Ok(()) => {
                self.pull_backoff.reset();
                self.pull_retry_at = None;
            }
            Err(e) => {
                let retry = self.cache.snapshot().is_some()
                    && (matches!(e, CacheError::Transient(_)) || self.cache.reconcile_pending());
                if retry {
                    let delay = self.pull_backoff.next_delay();
                    debug!(retry_in_ms = delay.as_millis() as u64, "revalidation failed: {e}");
                    self.pull_retry_at = Some(Instant::now() + delay);
                } else {
                    debug!("revalidation failed: {e}");
                    self.pull_retry_at = None;
                }
            }
        }
        self.publish();
        result
    }

    fn publish(&self) {
        let view = EntitlementView {
            state: self.state,
            snapshot: self.cache.snapshot().cloned(),
            reconcile_pending: self.cache.reconcile_pending(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

async fn next_connection(connecting: &mut Option<PendingConnect>) -> CacheResult<HubConnection> {
    match connecting {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<BoxStream<'static, EntitlementEvent>>) -> Option<EntitlementEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
