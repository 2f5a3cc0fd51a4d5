//! Authenticated sessions.

use crate::ids::{ClientId, ModuleId, SessionId, Topic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Network origin of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Remote address.
    pub address: IpAddr,
    /// ISO 3166-1 alpha-2 country, when supplied by a trusted edge.
    #[serde(default)]
    pub country: Option<String>,
    /// Whether the connection arrived through the corporate tunnel.
    #[serde(default)]
    pub via_tunnel: bool,
}

impl SourceInfo {
    /// A source with only an address known.
    #[must_use]
    pub fn from_address(address: IpAddr) -> Self {
        Self {
            address,
            country: None,
            via_tunnel: false,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_tunnel(mut self, via_tunnel: bool) -> Self {
        self.via_tunnel = via_tunnel;
        self
    }
}

/// A live authenticated context derived from a license.
///
/// `permissions` is a snapshot taken at issuance. It is the
/// authorization-of-record for the session and only changes through an
/// explicit re-check, never through pushed entitlement events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub client_id: ClientId,
    /// Signed credential; empty until the codec has issued it.
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub fingerprint: String,
    pub source: SourceInfo,
    pub permissions: BTreeSet<ModuleId>,
    /// Hub topic of the license at issuance.
    pub topic: Topic,
}

impl Session {
    /// Returns true if the session grants `module`.
    #[must_use]
    pub fn permits(&self, module: &ModuleId) -> bool {
        self.permissions.contains(module)
    }
}
