//! The access guard.

use crate::attempts::{AttemptTracker, BlockList};
use crate::audit::{AuditSink, SecurityEvent, SecurityEventKind, TracingAuditSink};
use crate::config::{GuardConfig, OriginPolicy};
use crate::error::{AuthError, AuthResult, RevalidateError, RevalidateResult};
use crate::sessions::SessionRegistry;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tollgate_credential::CredentialCodec;
use tollgate_store::{EntitlementStore, StoreError};
use tollgate_types::{
    ClientId, Clock, EntitlementDecision, License, LicenseStatus, Session, SessionId, SourceInfo,
};
use tracing::{debug, info};

/// An authentication request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub identity: String,
    pub secret: String,
    pub fingerprint: String,
    pub source: SourceInfo,
}

/// Guards credential issuance and tracks the sessions it issues.
pub struct AccessGuard {
    store: Arc<EntitlementStore>,
    codec: CredentialCodec,
    clock: Arc<dyn Clock>,
    config: GuardConfig,
    origin: OriginPolicy,
    attempts: AttemptTracker,
    blocks: BlockList,
    sessions: SessionRegistry,
    audit: Arc<dyn AuditSink>,
}

impl AccessGuard {
    /// Creates a guard over `store`, minting tokens with `codec`. Reads time
    /// from the store's clock.
    pub fn new(store: Arc<EntitlementStore>, codec: CredentialCodec, config: GuardConfig) -> Self {
        let clock = store.clock().clone();
        let blocks = BlockList::new(&config, clock.clone());
        let attempts = AttemptTracker::new(&config, blocks.clone(), clock.clone());
        let sessions = SessionRegistry::new(config.session_idle_timeout());
        Self {
            store,
            codec,
            clock,
            config,
            origin: OriginPolicy::default(),
            attempts,
            blocks,
            sessions,
            audit: Arc::new(TracingAuditSink),
        }
    }

    #[must_use]
    pub fn with_origin_policy(mut self, origin: OriginPolicy) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<EntitlementStore> {
        &self.store
    }

    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ── Authentication ───────────────────────────────────────────

    /// Authenticates `request`, giving up with `Timeout` after `timeout`.
    ///
    /// The attempt is counted before the secret is checked, so a timed-out
    /// call still consumes it.
    pub async fn authenticate(
        self: &Arc<Self>,
        request: AuthRequest,
        timeout: Duration,
    ) -> AuthResult<Session> {
        let identity = request.identity.clone();
        let address = request.source.address;
        match tokio::time::timeout(timeout, Arc::clone(self).authenticate_inner(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.audit(SecurityEventKind::Failure, &identity, address, "timeout");
                Err(AuthError::Timeout)
            }
        }
    }

    async fn authenticate_inner(self: Arc<Self>, request: AuthRequest) -> AuthResult<Session> {
        let AuthRequest {
            identity,
            secret,
            fingerprint,
            source,
        } = request;
        let address = source.address;

        if let Some(until) = self.blocks.blocked_until(&address) {
            self.audit(SecurityEventKind::Blocked, &identity, address, "address blocked");
            return Err(AuthError::Blocked { until });
        }

        if let Some(retry_after) = self.attempts.retry_after(&identity, address) {
            self.audit(SecurityEventKind::Blocked, &identity, address, "rate limited");
            return Err(AuthError::RateLimited { retry_after });
        }

        if let Err(reason) = self.origin.check(&source) {
            self.audit(SecurityEventKind::Failure, &identity, address, &reason);
            return Err(AuthError::PolicyDenied(reason));
        }

        let handle = match self.attempts.acquire(&identity, address) {
            Ok(handle) => handle,
            Err(retry_after) => {
                self.audit(SecurityEventKind::Blocked, &identity, address, "rate limited");
                return Err(AuthError::RateLimited { retry_after });
            }
        };

        // Argon2 verification is CPU-bound; keep it off the async workers.
        let store = self.store.clone();
        let lookup = identity.clone();
        let verified = tokio::task::spawn_blocking(move || store.verify_identity(&lookup, &secret))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))??;

        let Some(client_id) = verified else {
            match handle.fail() {
                Some(until) => {
                    self.audit(SecurityEventKind::Blocked, &identity, address, "attempt ceiling reached");
                    debug!(%address, %until, "blocking after repeated failures");
                }
                None => {
                    self.audit(SecurityEventKind::Failure, &identity, address, "invalid credentials");
                }
            }
            return Err(AuthError::InvalidCredentials);
        };
        handle.succeed();

        match self.open_session(&client_id, fingerprint, source) {
            Ok(session) => {
                self.audit(SecurityEventKind::Success, &identity, address, "authenticated");
                Ok(session)
            }
            Err(e) => {
                self.audit(SecurityEventKind::Failure, &identity, address, &e.to_string());
                Err(e)
            }
        }
    }

    fn open_session(
        &self,
        client_id: &ClientId,
        fingerprint: String,
        source: SourceInfo,
    ) -> AuthResult<Session> {
        let license = self.activate_on_first_login(client_id)?;
        let now = self.clock.now();
        let status = license.effective_status(now);
        if status != LicenseStatus::Active {
            return Err(AuthError::NotEntitled { status });
        }

        let mut session = Session {
            session_id: SessionId::new(),
            client_id: client_id.clone(),
            token: String::new(),
            created_at: now,
            last_activity: now,
            expires_at: now + self.config.session_ttl(),
            fingerprint,
            source,
            permissions: license.allowed_modules.clone(),
            topic: license.topic(),
        };
        session.token = self.codec.issue(&session)?;
        self.sessions.insert(session.clone());

        info!(
            client_id = %client_id,
            session_id = %session.session_id.as_uuid(),
            plan = %license.plan,
            "session opened"
        );
        Ok(session)
    }

    fn activate_on_first_login(&self, client_id: &ClientId) -> AuthResult<License> {
        let license = self.store.get(client_id)?;
        if license.status != LicenseStatus::Pending {
            return Ok(license);
        }
        match self.store.activate(client_id) {
            Ok(license) => {
                info!(client_id = %client_id, "license activated on first login");
                Ok(license)
            }
            // Activated concurrently by another login.
            Err(StoreError::InvalidTransition { .. }) => Ok(self.store.get(client_id)?),
            Err(e) => Err(e.into()),
        }
    }

    // ── Revalidation ─────────────────────────────────────────────

    /// Verifies `token` and returns its live session, marking it active.
    pub fn session_for(&self, token: &str) -> RevalidateResult<Session> {
        let now = self.clock.now();
        let credential = self.codec.verify_at(token, now)?;
        self.sessions
            .touch(&credential.session_id, now)
            .ok_or_else(|| RevalidateError::Invalid("session is no longer active".to_string()))
    }

    /// Re-checks `token` against the authoritative license.
    ///
    /// A revoked or expired license is not an error: the decision reports
    /// `granted = false` so clients can degrade.
    pub fn revalidate(&self, token: &str) -> RevalidateResult<EntitlementDecision> {
        let session = self.session_for(token)?;
        let snapshot = self.store.snapshot(&session.client_id)?;
        let status = snapshot.license.effective_status(self.clock.now());
        debug!(client_id = %session.client_id, %status, sequence = snapshot.sequence, "revalidated");
        Ok(EntitlementDecision {
            granted: status == LicenseStatus::Active,
            license: snapshot.license,
            reason: status.as_str().to_string(),
            sequence: snapshot.sequence,
        })
    }

    /// Re-snapshots the session's permissions from the current license and
    /// reissues its token. The session keeps its id and expiry.
    pub fn refresh(&self, token: &str) -> RevalidateResult<Session> {
        let mut session = self.session_for(token)?;
        let license = self.store.get(&session.client_id)?;
        let status = license.effective_status(self.clock.now());
        if status != LicenseStatus::Active {
            return Err(RevalidateError::NotEntitled { status });
        }

        session.permissions = license.allowed_modules.clone();
        session.topic = license.topic();
        session.token = self
            .codec
            .issue(&session)
            .map_err(|e| RevalidateError::Internal(e.to_string()))?;
        if !self.sessions.replace(session.clone()) {
            return Err(RevalidateError::Invalid("session was revoked".to_string()));
        }
        info!(client_id = %session.client_id, "session permissions refreshed");
        Ok(session)
    }

    // ── Administration ───────────────────────────────────────────

    /// Ends a session. Its token no longer revalidates.
    pub fn revoke_session(&self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Ends every session of `client_id`.
    pub fn revoke_client_sessions(&self, client_id: &ClientId) -> usize {
        let removed = self.sessions.remove_client(client_id);
        if removed > 0 {
            info!(client_id = %client_id, removed, "client sessions revoked");
        }
        removed
    }

    /// Returns the block deadline if `address` is blocked.
    pub fn blocked_until(&self, address: &IpAddr) -> Option<chrono::DateTime<chrono::Utc>> {
        self.blocks.blocked_until(address)
    }

    /// Lifts a block on `address`.
    pub fn unblock(&self, address: &IpAddr) -> bool {
        let lifted = self.blocks.unblock(address);
        if lifted {
            info!(%address, "address unblocked");
        }
        lifted
    }

    /// Drops dead sessions and runs cache maintenance. Returns the number of
    /// sessions dropped.
    pub fn collect_garbage(&self) -> usize {
        self.attempts.run_pending_tasks();
        self.blocks.run_pending_tasks();
        let dropped = self.sessions.collect_garbage(self.clock.now());
        if dropped > 0 {
            debug!(dropped, "collected sessions");
        }
        dropped
    }

    fn audit(&self, kind: SecurityEventKind, identity: &str, address: IpAddr, reason: &str) {
        self.audit.record(SecurityEvent {
            kind,
            identity: identity.to_string(),
            address,
            reason: reason.to_string(),
            timestamp: self.clock.now(),
        });
    }
}
