//! Server configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tollgate_guard::{GuardConfig, OriginPolicy};
use tollgate_hub::HubConfig;

/// Settings read from the optional JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub guard: GuardConfig,
    pub origin: OriginPolicy,
    pub hub: HubConfig,
    /// Take the source address, country and tunnel flag from
    /// `X-Forwarded-For`, `X-Geo-Country` and `X-Tunnel`.
    pub trust_proxy_headers: bool,
    /// Deadline for one authentication (ms).
    pub auth_timeout_ms: u64,
    /// Interval of the expiry sweep and session collection (seconds).
    pub maintenance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            origin: OriginPolicy::default(),
            hub: HubConfig::default(),
            trust_proxy_headers: false,
            auth_timeout_ms: 10_000,
            maintenance_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}
