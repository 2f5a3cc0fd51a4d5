//! Guard configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tollgate_types::SourceInfo;

/// Throttling and session limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Failed attempts per (identity, address) before the address is blocked.
    pub max_attempts: u32,
    /// Window over which attempts are counted (seconds).
    pub lockout_window_secs: u64,
    /// How long a blocked address stays blocked (seconds).
    pub block_duration_secs: u64,
    /// Absolute session lifetime (seconds).
    pub session_ttl_secs: u64,
    /// Session idle timeout (seconds).
    pub session_idle_timeout_secs: u64,
    /// Upper bound on tracked (identity, address) pairs.
    pub max_tracked_keys: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_window_secs: 15 * 60,
            block_duration_secs: 15 * 60,
            session_ttl_secs: 12 * 60 * 60,
            session_idle_timeout_secs: 30 * 60,
            max_tracked_keys: 100_000,
        }
    }
}

impl GuardConfig {
    pub fn lockout_window(&self) -> Duration {
        secs(self.lockout_window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        secs(self.block_duration_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        secs(self.session_ttl_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        secs(self.session_idle_timeout_secs)
    }
}

// Largest value `Duration::seconds` accepts.
const MAX_SECS: u64 = (i64::MAX / 1000) as u64;

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_SECS) as i64)
}

/// Where authentication attempts may come from.
///
/// The default policy admits every origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginPolicy {
    /// ISO 3166-1 alpha-2 codes admitted. Empty admits any country; when
    /// non-empty, a source without a country is refused.
    pub allowed_countries: BTreeSet<String>,
    /// Refuse sources that did not arrive through the tunnel.
    pub require_tunnel: bool,
}

impl OriginPolicy {
    /// Admits only the given countries.
    pub fn countries<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_countries: countries
                .into_iter()
                .map(|c| c.into().to_ascii_uppercase())
                .collect(),
            require_tunnel: false,
        }
    }

    #[must_use]
    pub fn requiring_tunnel(mut self) -> Self {
        self.require_tunnel = true;
        self
    }

    /// Checks `source`, returning the refusal reason if it is not admitted.
    pub fn check(&self, source: &SourceInfo) -> Result<(), String> {
        if self.require_tunnel && !source.via_tunnel {
            return Err("connection did not arrive through the tunnel".to_string());
        }
        if self.allowed_countries.is_empty() {
            return Ok(());
        }
        match &source.country {
            Some(country) if self.allowed_countries.contains(&country.to_ascii_uppercase()) => {
                Ok(())
            }
            Some(country) => Err(format!("country {country} is not allowed")),
            None => Err("source country is unknown".to_string()),
        }
    }
}
