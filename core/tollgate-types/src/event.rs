//! Entitlement events fanned out by the synchronization hub.

use crate::ids::{ClientId, Topic};
use crate::license::License;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a license.
///
/// Each variant carries every field a client needs to apply it, so an
/// event is decoded exhaustively or rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitlementEventKind {
    /// A license (or a new generation of one) was created.
    Created { license: License },
    /// A license was activated, extended, expired or consumed usage.
    Updated { license: License },
    /// A license was revoked.
    Revoked {
        client_id: ClientId,
        generation: u32,
        revoked_at: DateTime<Utc>,
    },
}

impl EntitlementEventKind {
    /// The client the event is about.
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        match self {
            Self::Created { license } | Self::Updated { license } => &license.client_id,
            Self::Revoked { client_id, .. } => client_id,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Revoked { .. } => "revoked",
        }
    }
}

/// A sequenced event on a hub topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementEvent {
    pub topic: Topic,
    /// Strictly increasing per topic, starting at 1.
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EntitlementEventKind,
}
