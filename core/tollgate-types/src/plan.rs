//! The plan catalog.

use crate::ids::ModuleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const DAY_SECS: i64 = 24 * 60 * 60;

/// A license plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Free tier, never expires.
    Free,
    /// Basic subscription.
    Basic,
    /// Premium subscription (analytics and automation).
    Premium,
    /// Enterprise contract.
    Enterprise,
}

impl Plan {
    /// All plans in ascending order.
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Basic, Plan::Premium, Plan::Enterprise];

    /// Returns the modules unlocked by this plan.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<ModuleId> {
        let names: &[&str] = match self {
            Self::Free => &["core"],
            Self::Basic => &["core", "documents"],
            Self::Premium => &["core", "documents", "analytics", "automation"],
            Self::Enterprise => &[
                "core",
                "documents",
                "analytics",
                "automation",
                "vectors",
                "admin",
            ],
        };
        names.iter().map(|n| ModuleId::from(*n)).collect()
    }

    /// Returns the usage ceiling per cycle, or None for unlimited.
    #[must_use]
    pub fn usage_ceiling(&self) -> Option<u64> {
        match self {
            Self::Free => Some(100),
            Self::Basic => Some(1_000),
            Self::Premium => Some(10_000),
            Self::Enterprise => None,
        }
    }

    /// Returns the term in seconds for this plan, or None for non-expiring.
    #[must_use]
    pub fn term_secs(&self) -> Option<i64> {
        match self {
            Self::Free => None,
            Self::Basic | Self::Premium => Some(30 * DAY_SECS),
            Self::Enterprise => Some(365 * DAY_SECS),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(crate::Error::UnknownPlan(other.to_string())),
        }
    }
}
