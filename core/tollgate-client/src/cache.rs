//! The client entitlement cache.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::source::EntitlementSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tollgate_credential::{CredentialCodec, CredentialError};
use tollgate_types::{
    Clock, EntitlementDecision, EntitlementEvent, EntitlementEventKind, License, LicenseStatus,
    ModuleId, SystemClock,
};
use tracing::{debug, info, warn};

/// Gate state of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleGate {
    Allowed,
    AllowedStale,
    Denied,
}

impl ModuleGate {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// The client's copy of its license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntitlementSnapshot {
    pub license: License,
    pub token: String,
    pub last_sequence_seen: u64,
    /// Time of the last successful authoritative pull.
    pub fetched_at: DateTime<Utc>,
    /// Set when a pull failed after `fetched_at`.
    pub stale_since_at: Option<DateTime<Utc>>,
}

/// What [`EntitlementCache::apply_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event changed the license.
    Applied,
    /// The sequence advanced; the license was unaffected.
    Advanced,
    /// Duplicate, older, or off-topic; nothing changed.
    Ignored,
}

/// Gates `module` against `snapshot` as of `now`.
#[must_use]
pub fn gate(
    snapshot: Option<&ClientEntitlementSnapshot>,
    module: &ModuleId,
    now: DateTime<Utc>,
    config: &CacheConfig,
) -> ModuleGate {
    let Some(snapshot) = snapshot else {
        return ModuleGate::Denied;
    };
    if !snapshot.license.allows(module, now) {
        return ModuleGate::Denied;
    }
    let age = now - snapshot.fetched_at;
    if age <= config.fresh_for() {
        ModuleGate::Allowed
    } else if age <= config.staleness_bound() {
        ModuleGate::AllowedStale
    } else {
        ModuleGate::Denied
    }
}

/// Client-side entitlement state.
///
/// Every mutation takes `&mut self`; run it on a single task (see
/// [`EntitlementClient`](crate::EntitlementClient)) so pulls and pushes
/// never interleave.
pub struct EntitlementCache {
    config: CacheConfig,
    source: Arc<dyn EntitlementSource>,
    verifier: Option<CredentialCodec>,
    clock: Arc<dyn Clock>,
    snapshot: Option<ClientEntitlementSnapshot>,
    reconcile_pending: bool,
}

impl EntitlementCache {
    pub fn new(config: CacheConfig, source: Arc<dyn EntitlementSource>) -> Self {
        Self {
            config,
            source,
            verifier: None,
            clock: Arc::new(SystemClock),
            snapshot: None,
            reconcile_pending: false,
        }
    }

    /// Verifies tokens locally with `verifier` before every pull.
    #[must_use]
    pub fn with_verifier(mut self, verifier: CredentialCodec) -> Self {
        self.verifier = Some(verifier.to_verifier());
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn snapshot(&self) -> Option<&ClientEntitlementSnapshot> {
        self.snapshot.as_ref()
    }

    /// A pushed event was missed and no pull has succeeded since.
    pub fn reconcile_pending(&self) -> bool {
        self.reconcile_pending
    }

    pub fn last_sequence_seen(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.last_sequence_seen)
    }

    // ── Gating ───────────────────────────────────────────────────

    pub fn gate(&self, module: &ModuleId) -> ModuleGate {
        gate(self.snapshot.as_ref(), module, self.clock.now(), &self.config)
    }

    pub fn is_module_allowed(&self, module: &ModuleId) -> bool {
        self.gate(module).is_allowed()
    }

    // ── Pulls ────────────────────────────────────────────────────

    /// Pulls the license for `token` and installs it as the snapshot.
    ///
    /// An existing snapshot on the same topic keeps its sequence
    /// baseline if that is ahead of the pull.
    pub async fn bootstrap(&mut self, token: &str) -> CacheResult<ClientEntitlementSnapshot> {
        if let Err(e) = self.verify_locally(token) {
            if matches!(e, CacheError::Invalid(_)) {
                self.purge();
            }
            return Err(e);
        }
        let decision = match self.pull(token).await {
            Ok(decision) => decision,
            Err(e) => {
                if matches!(e, CacheError::Invalid(_)) {
                    self.purge();
                }
                return Err(e);
            }
        };

        let now = self.clock.now();
        let last_sequence_seen = self
            .snapshot
            .as_ref()
            .filter(|s| s.license.topic() == decision.license.topic())
            .map_or(decision.sequence, |s| s.last_sequence_seen.max(decision.sequence));
        let snapshot = ClientEntitlementSnapshot {
            license: decision.license,
            token: token.to_string(),
            last_sequence_seen,
            fetched_at: now,
            stale_since_at: None,
        };
        info!(
            client_id = %snapshot.license.client_id,
            status = %snapshot.license.status,
            sequence = last_sequence_seen,
            "entitlements bootstrapped"
        );
        self.snapshot = Some(snapshot.clone());
        self.reconcile_pending = false;
        Ok(snapshot)
    }

    /// Pulls the authoritative license for the current token.
    ///
    /// `Invalid` purges the cache. `Expired` and transient failures keep the
    /// snapshot and mark it stale; modules then degrade by age.
    pub async fn periodic_revalidate(&mut self) -> CacheResult<()> {
        let token = self
            .snapshot
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(CacheError::NotBootstrapped)?;

        let result = match self.verify_locally(&token) {
            Ok(()) => self.pull(&token).await,
            Err(e) => Err(e),
        };
        let now = self.clock.now();

        match result {
            Ok(decision) => {
                self.install(decision, now);
                Ok(())
            }
            Err(CacheError::Invalid(reason)) => {
                warn!(%reason, "credential rejected, purging entitlements");
                self.purge();
                Err(CacheError::Invalid(reason))
            }
            Err(e) => {
                if let Some(snapshot) = self.snapshot.as_mut() {
                    snapshot.stale_since_at.get_or_insert(now);
                }
                debug!("revalidation failed, keeping snapshot: {e}");
                Err(e)
            }
        }
    }

    fn install(&mut self, decision: EntitlementDecision, now: DateTime<Utc>) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };
        // A pull never rolls back a newer pushed record.
        if decision.sequence >= snapshot.last_sequence_seen
            || decision.license.supersedes(&snapshot.license)
        {
            snapshot.license = decision.license;
        }
        snapshot.last_sequence_seen = snapshot.last_sequence_seen.max(decision.sequence);
        snapshot.fetched_at = now;
        snapshot.stale_since_at = None;
        self.reconcile_pending = false;
        debug!(
            status = %snapshot.license.status,
            granted = decision.granted,
            sequence = snapshot.last_sequence_seen,
            "revalidated"
        );
    }

    async fn pull(&self, token: &str) -> CacheResult<EntitlementDecision> {
        match tokio::time::timeout(self.config.pull_timeout(), self.source.revalidate(token)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Transient("revalidation timed out".to_string())),
        }
    }

    fn verify_locally(&self, token: &str) -> CacheResult<()> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };
        match verifier.verify_at(token, self.clock.now()) {
            Ok(_) => Ok(()),
            Err(CredentialError::Expired { expired_at }) => Err(CacheError::Expired { expired_at }),
            Err(e) => Err(CacheError::Invalid(e.to_string())),
        }
    }

    /// Replaces the token used for pulls, e.g. after a refresh.
    pub fn replace_token(&mut self, token: impl Into<String>) {
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.token = token.into();
        }
    }

    /// Drops the snapshot. Every module gates `Denied`.
    pub fn purge(&mut self) {
        self.snapshot = None;
        self.reconcile_pending = false;
    }

    // ── Pushes ───────────────────────────────────────────────────

    /// Applies one pushed event.
    ///
    /// Only the next sequence is applied. An older or duplicate sequence is
    /// ignored. A gap applies nothing, sets `reconcile_pending` and returns
    /// `SequenceGap`.
    pub fn apply_event(&mut self, event: &EntitlementEvent) -> CacheResult<ApplyOutcome> {
        let snapshot = self.snapshot.as_mut().ok_or(CacheError::NotBootstrapped)?;
        if event.topic != snapshot.license.topic() {
            return Ok(ApplyOutcome::Ignored);
        }

        let expected = snapshot.last_sequence_seen + 1;
        if event.sequence < expected {
            return Ok(ApplyOutcome::Ignored);
        }
        if event.sequence > expected {
            self.reconcile_pending = true;
            warn!(expected, received = event.sequence, "sequence gap, reconciliation scheduled");
            return Err(CacheError::SequenceGap {
                expected,
                received: event.sequence,
            });
        }
        snapshot.last_sequence_seen = event.sequence;

        if event.kind.client_id() != &snapshot.license.client_id {
            return Ok(ApplyOutcome::Advanced);
        }
        let outcome = match &event.kind {
            EntitlementEventKind::Created { license } | EntitlementEventKind::Updated { license } => {
                if license.supersedes(&snapshot.license) {
                    snapshot.license = license.clone();
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Advanced
                }
            }
            EntitlementEventKind::Revoked { generation, .. } => {
                if *generation >= snapshot.license.generation {
                    snapshot.license.status = LicenseStatus::Revoked;
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Advanced
                }
            }
        };
        debug!(
            sequence = event.sequence,
            kind = event.kind.name(),
            status = %snapshot.license.status,
            "event applied"
        );
        Ok(outcome)
    }
}
