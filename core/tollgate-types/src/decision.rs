use crate::license::License;
use serde::{Deserialize, Serialize};

/// The answer to "is this client entitled right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDecision {
    pub granted: bool,
    pub license: License,
    /// Machine-readable reason (`active`, `expired`, `revoked`, `pending`).
    pub reason: String,
    /// Head sequence of the license topic when the license was read.
    pub sequence: u64,
}
