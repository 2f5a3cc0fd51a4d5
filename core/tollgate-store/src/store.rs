//! The entitlement store and its single mutation path.

use crate::backend::{IdentityRecord, LicenseBackend};
use crate::error::{StoreError, StoreResult};
use crate::locks::KeyedLocks;
use crate::secret::{self, KdfParams};
use crate::sink::{EventSink, NoopSink};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, OnceLock};
use tollgate_types::{
    ClientId, Clock, EntitlementEventKind, License, LicenseStatus, Plan, SystemClock, Usage,
};
use tracing::{debug, info, warn};

/// Maximum compare-and-swap attempts per mutation.
pub const MAX_CAS_RETRIES: usize = 8;

/// Configuration for the entitlement store.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Argon2id parameters for newly registered identity secrets.
    pub kdf: KdfParams,
}

/// Parameters for a new license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub client_id: ClientId,
    pub plan: Plan,
    pub tenant: Option<String>,
}

impl NewLicense {
    pub fn new(client_id: impl Into<ClientId>, plan: Plan) -> Self {
        Self {
            client_id: client_id.into(),
            plan,
            tenant: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// A license together with the head sequence of its topic, read atomically
/// with respect to mutations of that license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseSnapshot {
    pub license: License,
    pub sequence: u64,
}

/// Which event a mutation emits.
enum Change {
    Created,
    Updated,
    Revoked,
}

/// The authoritative record of licenses and identities.
///
/// Construct one per deployment and share it as `Arc<EntitlementStore>`.
pub struct EntitlementStore {
    backend: Arc<dyn LicenseBackend>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    config: StoreConfig,
    dummy_hash: OnceLock<String>,
}

impl EntitlementStore {
    /// Creates a store that discards events and uses the system clock.
    pub fn new(backend: Arc<dyn LicenseBackend>) -> Self {
        Self::with_parts(
            backend,
            Arc::new(NoopSink),
            Arc::new(SystemClock),
            StoreConfig::default(),
        )
    }

    /// Creates a store from explicit collaborators.
    pub fn with_parts(
        backend: Arc<dyn LicenseBackend>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            clock,
            locks: KeyedLocks::new(),
            config,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Returns the store's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns the stored license for `client_id`.
    ///
    /// The record is returned as persisted; use
    /// [`License::effective_status`] to account for an elapsed term the
    /// expiry sweep has not recorded yet.
    pub fn get(&self, client_id: &ClientId) -> StoreResult<License> {
        self.backend
            .load(client_id)?
            .ok_or_else(|| StoreError::NotFound(client_id.clone()))
    }

    /// Returns the license and the head sequence of its topic.
    ///
    /// Both are read under the client's mutation lock, so every event about
    /// this license with a sequence at or below `sequence` is reflected in
    /// `license`.
    pub fn snapshot(&self, client_id: &ClientId) -> StoreResult<LicenseSnapshot> {
        let _guard = self.locks.lock(client_id);
        let license = self.get(client_id)?;
        let sequence = self.sink.head_sequence(&license.topic());
        Ok(LicenseSnapshot { license, sequence })
    }

    /// Returns every stored license.
    pub fn list(&self) -> StoreResult<Vec<License>> {
        self.backend.list()
    }

    // ── Lifecycle mutations ──────────────────────────────────────

    /// Creates a pending license for `client_id` on `plan`.
    pub fn create_license(&self, client_id: impl Into<ClientId>, plan: Plan) -> StoreResult<License> {
        self.create_license_with(NewLicense::new(client_id, plan))
    }

    /// Creates a pending license.
    ///
    /// Fails with `AlreadyExists` if a non-revoked license exists. Over a
    /// revoked license a new generation is created.
    pub fn create_license_with(&self, new: NewLicense) -> StoreResult<License> {
        let NewLicense {
            client_id,
            plan,
            tenant,
        } = new;
        self.mutate(&client_id, "create", |current, now| {
            let generation = match current {
                None => 0,
                Some(existing) if existing.status == LicenseStatus::Revoked => {
                    existing.generation + 1
                }
                Some(_) => return Err(StoreError::AlreadyExists(client_id.clone())),
            };
            let license = License::new(client_id.clone(), plan, tenant.clone(), now, generation);
            Ok((license, Change::Created))
        })
    }

    /// Activates a pending license. The term starts at activation.
    pub fn activate(&self, client_id: &ClientId) -> StoreResult<License> {
        self.mutate(client_id, "activate", |current, now| {
            let mut license = existing(client_id, current)?;
            match license.status {
                LicenseStatus::Pending => {
                    license.status = LicenseStatus::Active;
                    license.expires_at = license
                        .plan
                        .term_secs()
                        .map(|secs| now + Duration::seconds(secs));
                    Ok((license, Change::Updated))
                }
                LicenseStatus::Revoked => Err(StoreError::Revoked(client_id.clone())),
                from => Err(StoreError::InvalidTransition {
                    client_id: client_id.clone(),
                    from,
                    operation: "activate",
                }),
            }
        })
    }

    /// Extends the license by one plan term.
    ///
    /// This is the renewal path: it succeeds on an expired license and moves
    /// it back to active. Non-expiring plans keep `expires_at = None`.
    pub fn extend(&self, client_id: &ClientId) -> StoreResult<License> {
        self.extend_inner(client_id, None)
    }

    /// Extends the license by `term`.
    pub fn extend_by(&self, client_id: &ClientId, term: Duration) -> StoreResult<License> {
        self.extend_inner(client_id, Some(term))
    }

    fn extend_inner(&self, client_id: &ClientId, term: Option<Duration>) -> StoreResult<License> {
        self.mutate(client_id, "extend", |current, now| {
            let mut license = existing(client_id, current)?;
            if license.status == LicenseStatus::Revoked {
                return Err(StoreError::Revoked(client_id.clone()));
            }
            let term = term.or_else(|| license.plan.term_secs().map(Duration::seconds));
            if let (Some(term), Some(expires_at)) = (term, license.expires_at) {
                license.expires_at = Some(expires_at.max(now) + term);
            }
            if license.effective_status(now) == LicenseStatus::Expired {
                license.status = LicenseStatus::Active;
            }
            Ok((license, Change::Updated))
        })
    }

    /// Revokes the license. Terminal.
    pub fn revoke(&self, client_id: &ClientId) -> StoreResult<License> {
        self.mutate(client_id, "revoke", |current, _now| {
            let mut license = existing(client_id, current)?;
            if license.status == LicenseStatus::Revoked {
                return Err(StoreError::Revoked(client_id.clone()));
            }
            license.status = LicenseStatus::Revoked;
            Ok((license, Change::Revoked))
        })
    }

    /// Records `delta` units of usage in the current cycle.
    ///
    /// Exhausting the ceiling rejects further usage with `LimitExceeded`;
    /// the license itself stays active.
    pub fn record_usage(&self, client_id: &ClientId, delta: u64) -> StoreResult<Usage> {
        if delta == 0 {
            let license = self.get(client_id)?;
            return Ok(license.usage.rolled(self.clock.now()));
        }
        let license = self.mutate(client_id, "record_usage", |current, now| {
            let mut license = existing(client_id, current)?;
            let status = license.effective_status(now);
            if status != LicenseStatus::Active {
                return Err(StoreError::NotEntitled {
                    client_id: client_id.clone(),
                    status,
                });
            }
            let mut usage = license.usage.rolled(now);
            let used = usage.count.saturating_add(delta);
            if let Some(ceiling) = license.plan.usage_ceiling() {
                if used > ceiling {
                    return Err(StoreError::LimitExceeded {
                        used: usage.count,
                        requested: delta,
                        ceiling,
                    });
                }
            }
            usage.count = used;
            license.usage = usage;
            Ok((license, Change::Updated))
        })?;
        Ok(license.usage)
    }

    /// Persists `active → expired` for every license whose term has elapsed.
    /// Returns the licenses that transitioned.
    pub fn expire_due(&self) -> StoreResult<Vec<License>> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for candidate in self.backend.list()? {
            if candidate.status != LicenseStatus::Active
                || candidate.effective_status(now) != LicenseStatus::Expired
            {
                continue;
            }
            let result = self.mutate(&candidate.client_id, "expire", |current, now| {
                let mut license = existing(&candidate.client_id, current)?;
                if license.status != LicenseStatus::Active
                    || license.effective_status(now) != LicenseStatus::Expired
                {
                    return Err(StoreError::InvalidTransition {
                        client_id: candidate.client_id.clone(),
                        from: license.status,
                        operation: "expire",
                    });
                }
                license.status = LicenseStatus::Expired;
                Ok((license, Change::Updated))
            });
            match result {
                Ok(license) => expired.push(license),
                // Renewed or revoked between the scan and the write.
                Err(StoreError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired licenses");
        }
        Ok(expired)
    }

    // ── Identities ───────────────────────────────────────────────

    /// Registers a login identity for `client_id`.
    pub fn register_identity(
        &self,
        identity: &str,
        secret: &str,
        client_id: &ClientId,
    ) -> StoreResult<IdentityRecord> {
        let record = IdentityRecord {
            identity: identity.to_string(),
            client_id: client_id.clone(),
            secret_hash: secret::hash_secret(secret, &self.config.kdf)?,
            created_at: self.clock.now(),
        };
        if !self.backend.insert_identity(&record)? {
            return Err(StoreError::IdentityExists(identity.to_string()));
        }
        debug!(identity, client_id = %client_id, "registered identity");
        Ok(record)
    }

    /// Creates a license and its login identity in one call.
    ///
    /// The identity is claimed first; if the license cannot be created the
    /// identity is removed again, so a failed call leaves neither behind.
    pub fn register(
        &self,
        identity: &str,
        secret: &str,
        new: NewLicense,
    ) -> StoreResult<License> {
        let client_id = new.client_id.clone();
        self.register_identity(identity, secret, &client_id)?;
        match self.create_license_with(new) {
            Ok(license) => Ok(license),
            Err(e) => {
                if let Err(rollback) = self.backend.delete_identity(identity) {
                    warn!(identity, client_id = %client_id, "identity rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Checks `secret` for `identity`, returning the bound client on success.
    ///
    /// Unknown identities are checked against a dummy hash so the call takes
    /// the same time either way.
    pub fn verify_identity(&self, identity: &str, secret: &str) -> StoreResult<Option<ClientId>> {
        match self.backend.load_identity(identity)? {
            Some(record) => {
                Ok(secret::verify_secret(secret, &record.secret_hash).then_some(record.client_id))
            }
            None => {
                let _ = secret::verify_secret(secret, self.dummy_hash()?);
                Ok(None)
            }
        }
    }

    /// Hash of a fixed secret under this store's parameters, computed once.
    fn dummy_hash(&self) -> StoreResult<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash);
        }
        let hash = secret::hash_secret("tollgate-unknown-identity", &self.config.kdf)?;
        Ok(self.dummy_hash.get_or_init(|| hash))
    }

    // ── Mutation path ────────────────────────────────────────────

    /// Reads, transforms and compare-and-swaps one license, then emits the
    /// event. Runs under the client's lock; retries on CAS conflicts from
    /// other processes sharing the backend.
    fn mutate<F>(&self, client_id: &ClientId, operation: &'static str, mut f: F) -> StoreResult<License>
    where
        F: FnMut(Option<&License>, DateTime<Utc>) -> StoreResult<(License, Change)>,
    {
        let _guard = self.locks.lock(client_id);

        for attempt in 0..MAX_CAS_RETRIES {
            let current = self.backend.load(client_id)?;
            let now = self.clock.now();
            let (mut next, change) = f(current.as_ref(), now)?;

            let expected = current.as_ref().map(|l| l.revision);
            next.revision = expected.map_or(0, |rev| rev + 1);

            if self.backend.compare_and_swap(expected, &next)? {
                debug!(
                    client_id = %client_id,
                    operation,
                    revision = next.revision,
                    status = %next.status,
                    "license mutated"
                );
                self.emit(&next, change, now);
                return Ok(next);
            }
            debug!(client_id = %client_id, operation, attempt, "compare-and-swap conflict, retrying");
        }

        warn!(client_id = %client_id, operation, "compare-and-swap retries exhausted");
        Err(StoreError::Conflict(client_id.clone()))
    }

    fn emit(&self, license: &License, change: Change, now: DateTime<Utc>) {
        let kind = match change {
            Change::Created => EntitlementEventKind::Created {
                license: license.clone(),
            },
            Change::Updated => EntitlementEventKind::Updated {
                license: license.clone(),
            },
            Change::Revoked => EntitlementEventKind::Revoked {
                client_id: license.client_id.clone(),
                generation: license.generation,
                revoked_at: now,
            },
        };
        let topic = license.topic();
        if let Err(e) = self.sink.publish(&topic, kind) {
            // The write stands; clients converge through revalidation.
            warn!(client_id = %license.client_id, topic = %topic, "event emission failed: {e}");
        }
    }
}

fn existing(client_id: &ClientId, current: Option<&License>) -> StoreResult<License> {
    current
        .cloned()
        .ok_or_else(|| StoreError::NotFound(client_id.clone()))
}
