//! Attempt counters and the address block list.
//!
//! Both live in expiring moka caches. Window and block decisions read the
//! injected clock; the cache TTLs only bound memory.

use chrono::{DateTime, Duration, Utc};
use moka::sync::Cache;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tollgate_types::Clock;
use tracing::{debug, warn};

use crate::GuardConfig;

type AttemptKey = (String, IpAddr);

/// Attempts counted for one (identity, address) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub identity_key: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl AttemptRecord {
    fn new(identity_key: String, now: DateTime<Utc>) -> Self {
        Self {
            identity_key,
            count: 0,
            window_start: now,
        }
    }

    /// Restarts the window if it has elapsed.
    fn roll(&mut self, now: DateTime<Utc>, window: Duration) {
        if now >= self.window_start + window {
            self.count = 0;
            self.window_start = now;
        }
    }
}

/// Addresses refused outright until a deadline.
#[derive(Clone)]
pub struct BlockList {
    entries: Cache<IpAddr, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl BlockList {
    pub fn new(config: &GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.block_duration().to_std().unwrap_or_default();
        Self {
            entries: Cache::builder()
                .max_capacity(config.max_tracked_keys)
                .time_to_live(ttl)
                .build(),
            clock,
        }
    }

    /// Blocks `address` until `until`.
    pub fn block(&self, address: IpAddr, until: DateTime<Utc>) {
        warn!(%address, %until, "address blocked");
        self.entries.insert(address, until);
    }

    /// Returns the block deadline if `address` is currently blocked.
    pub fn blocked_until(&self, address: &IpAddr) -> Option<DateTime<Utc>> {
        let until = self.entries.get(address)?;
        if self.clock.now() < until {
            Some(until)
        } else {
            self.entries.invalidate(address);
            None
        }
    }

    /// Lifts a block. Returns true if the address was blocked.
    pub fn unblock(&self, address: &IpAddr) -> bool {
        self.entries.remove(address).is_some()
    }

    pub(crate) fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

/// Per-(identity, address) attempt counters.
#[derive(Clone)]
pub struct AttemptTracker {
    records: Cache<AttemptKey, Arc<Mutex<AttemptRecord>>>,
    blocks: BlockList,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    window: Duration,
    block_duration: Duration,
}

impl AttemptTracker {
    pub fn new(config: &GuardConfig, blocks: BlockList, clock: Arc<dyn Clock>) -> Self {
        // Idle eviction: every attempt touches the entry, so an entry idle for
        // a full window has no live attempts left.
        let idle = config.lockout_window().to_std().unwrap_or_default();
        Self {
            records: Cache::builder()
                .max_capacity(config.max_tracked_keys)
                .time_to_idle(idle)
                .build(),
            blocks,
            clock,
            max_attempts: config.max_attempts,
            window: config.lockout_window(),
            block_duration: config.block_duration(),
        }
    }

    fn record(&self, identity: &str, address: IpAddr) -> Arc<Mutex<AttemptRecord>> {
        let now = self.clock.now();
        self.records
            .get_with((identity.to_string(), address), || {
                Arc::new(Mutex::new(AttemptRecord::new(identity.to_string(), now)))
            })
    }

    /// Returns how long to wait if the pair is at its ceiling. Does not count
    /// an attempt.
    pub fn retry_after(&self, identity: &str, address: IpAddr) -> Option<Duration> {
        let record = self.records.get(&(identity.to_string(), address))?;
        let now = self.clock.now();
        let mut record = lock(&record);
        record.roll(now, self.window);
        (record.count >= self.max_attempts).then(|| record.window_start + self.window - now)
    }

    /// Counts one attempt and returns its handle, or the wait time if the
    /// pair is already at its ceiling.
    pub fn acquire(&self, identity: &str, address: IpAddr) -> Result<AttemptHandle, Duration> {
        let record = self.record(identity, address);
        let now = self.clock.now();
        {
            let mut guard = lock(&record);
            guard.roll(now, self.window);
            if guard.count >= self.max_attempts {
                return Err(guard.window_start + self.window - now);
            }
            guard.count += 1;
            debug!(identity, %address, count = guard.count, "attempt acquired");
        }
        Ok(AttemptHandle {
            record,
            tracker: self.clone(),
            address,
            resolved: false,
        })
    }

    /// Returns a copy of the record for the pair, if tracked.
    pub fn snapshot(&self, identity: &str, address: IpAddr) -> Option<AttemptRecord> {
        self.records
            .get(&(identity.to_string(), address))
            .map(|record| {
                let guard = lock(&record);
                guard.clone()
            })
    }

    pub(crate) fn run_pending_tasks(&self) {
        self.records.run_pending_tasks();
    }

    /// Records a failure already counted at acquisition, blocking the address
    /// once the ceiling is reached.
    fn fail(&self, record: &Mutex<AttemptRecord>, address: IpAddr) -> Option<DateTime<Utc>> {
        let count = lock(record).count;
        if count < self.max_attempts {
            return None;
        }
        let until = self.clock.now() + self.block_duration;
        self.blocks.block(address, until);
        Some(until)
    }
}

/// One counted attempt.
///
/// Resolve it with [`AttemptHandle::succeed`] or [`AttemptHandle::fail`].
/// Dropping it unresolved (a timeout or cancellation) counts as a failure.
#[must_use = "dropping an attempt handle counts as a failure"]
pub struct AttemptHandle {
    record: Arc<Mutex<AttemptRecord>>,
    tracker: AttemptTracker,
    address: IpAddr,
    resolved: bool,
}

impl AttemptHandle {
    /// The attempt succeeded: clears the counter.
    pub fn succeed(mut self) {
        self.resolved = true;
        let mut record = lock(&self.record);
        record.count = 0;
        record.window_start = self.tracker.clock.now();
    }

    /// The attempt failed. Returns the block deadline if this failure
    /// blocked the address.
    pub fn fail(mut self) -> Option<DateTime<Utc>> {
        self.resolved = true;
        self.tracker.fail(&self.record, self.address)
    }
}

impl Drop for AttemptHandle {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(address = %self.address, "attempt abandoned, counted as failure");
            self.tracker.fail(&self.record, self.address);
        }
    }
}

fn lock(record: &Mutex<AttemptRecord>) -> MutexGuard<'_, AttemptRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}
