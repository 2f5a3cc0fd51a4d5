//! Cache and runtime configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Freshness bounds and timing for the client cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age up to which a snapshot gates `Allowed` (seconds).
    pub fresh_for_secs: u64,
    /// Age beyond which every module is `Denied` (seconds).
    pub staleness_bound_secs: u64,
    /// Interval between authoritative pulls (seconds).
    pub revalidate_interval_secs: u64,
    /// Timeout for one pull (ms).
    pub pull_timeout_ms: u64,
    /// Timeout for one hub connect, through the subscribe acknowledgement (ms).
    pub connect_timeout_ms: u64,
    /// First reconnect delay (ms).
    pub backoff_initial_ms: u64,
    /// Reconnect delay cap (ms).
    pub backoff_max_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_for_secs: 5 * 60,
            staleness_bound_secs: 30 * 60,
            revalidate_interval_secs: 2 * 60,
            pull_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl CacheConfig {
    pub fn fresh_for(&self) -> Duration {
        Duration::seconds(self.fresh_for_secs as i64)
    }

    pub fn staleness_bound(&self) -> Duration {
        Duration::seconds(self.staleness_bound_secs as i64)
    }

    pub fn revalidate_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.revalidate_interval_secs.max(1))
    }

    pub fn pull_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}
