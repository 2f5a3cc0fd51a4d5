//! The authoritative license record.

use crate::ids::{ClientId, ModuleId, Topic};
use crate::plan::Plan;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Length of the rolling usage cycle (30 days).
pub const USAGE_CYCLE_SECS: i64 = 30 * 24 * 60 * 60;

/// Lifecycle status of a license.
///
/// Transitions only move forward (`Pending → Active → Expired → Revoked`),
/// except renewal which moves `Expired → Active`. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Registered, not yet activated.
    Pending,
    /// Valid and active.
    Active,
    /// Term elapsed; renewable through `extend`.
    Expired,
    /// Revoked by an administrator.
    Revoked,
}

impl LicenseStatus {
    /// Returns true if no transition can leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counter for the current rolling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Units consumed in the current cycle.
    pub count: u64,
    /// Start of the current cycle.
    pub cycle_start: DateTime<Utc>,
}

impl Usage {
    /// A fresh counter whose cycle starts at `now`.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            cycle_start: now,
        }
    }

    /// Returns the counter as it stands at `now`, restarting it at the most
    /// recent cycle boundary if one or more cycles have elapsed.
    #[must_use]
    pub fn rolled(&self, now: DateTime<Utc>) -> Self {
        let elapsed = (now - self.cycle_start).num_seconds();
        if elapsed < USAGE_CYCLE_SECS {
            return *self;
        }
        let cycles = elapsed / USAGE_CYCLE_SECS;
        Self {
            count: 0,
            cycle_start: self.cycle_start + Duration::seconds(cycles * USAGE_CYCLE_SECS),
        }
    }
}

/// The authoritative entitlement record for one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub client_id: ClientId,
    pub plan: Plan,
    /// Tenant the license belongs to; selects the broadcast topic.
    #[serde(default)]
    pub tenant: Option<String>,
    pub status: LicenseStatus,
    pub issued_at: DateTime<Utc>,
    /// Expiration, or None for non-expiring licenses.
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_modules: BTreeSet<ModuleId>,
    pub usage: Usage,
    /// Incremented each time a revoked license is replaced by a new one.
    pub generation: u32,
    /// Incremented on every stored mutation.
    pub revision: u64,
}

impl License {
    /// Creates a pending license for `plan`, issued at `now`.
    #[must_use]
    pub fn new(
        client_id: ClientId,
        plan: Plan,
        tenant: Option<String>,
        now: DateTime<Utc>,
        generation: u32,
    ) -> Self {
        Self {
            client_id,
            plan,
            tenant,
            status: LicenseStatus::Pending,
            issued_at: now,
            expires_at: plan.term_secs().map(|secs| now + Duration::seconds(secs)),
            allowed_modules: plan.modules(),
            usage: Usage::starting_at(now),
            generation,
            revision: 0,
        }
    }

    /// The topic every event about this license is published on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match &self.tenant {
            Some(tenant) => Topic::tenant(tenant),
            None => Topic::plan(self.plan),
        }
    }

    /// Returns the status as observed at `now`.
    ///
    /// An active license whose term has elapsed reports `Expired` even if
    /// the expiry sweep has not persisted the transition yet.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> LicenseStatus {
        match (self.status, self.expires_at) {
            (LicenseStatus::Active, Some(exp)) if exp <= now => LicenseStatus::Expired,
            (status, _) => status,
        }
    }

    /// Returns true if the license grants access at `now`.
    #[must_use]
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == LicenseStatus::Active
    }

    /// Returns true if the license grants `module` at `now`.
    #[must_use]
    pub fn allows(&self, module: &ModuleId, now: DateTime<Utc>) -> bool {
        self.is_entitled(now) && self.allowed_modules.contains(module)
    }

    /// Returns true if this record is at least as new as `other`.
    #[must_use]
    pub fn supersedes(&self, other: &License) -> bool {
        (self.generation, self.revision) >= (other.generation, other.revision)
    }
}
