//! Narrow persistence API behind the entitlement store.

use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tollgate_types::{ClientId, License};

/// Login identity bound to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity: String,
    pub client_id: ClientId,
    /// Argon2id PHC string.
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Storage for license and identity records.
///
/// The store never mutates a record in place: it reads, computes the next
/// record and writes it back with [`LicenseBackend::compare_and_swap`], so a
/// backend shared by several processes still linearizes writes.
pub trait LicenseBackend: Send + Sync {
    /// Loads the license for `client_id`.
    fn load(&self, client_id: &ClientId) -> StoreResult<Option<License>>;

    /// Writes `license` only if the stored revision equals `expected`
    /// (`None` meaning no record exists). Returns false on a mismatch.
    fn compare_and_swap(&self, expected: Option<u64>, license: &License) -> StoreResult<bool>;

    /// Returns every stored license.
    fn list(&self) -> StoreResult<Vec<License>>;

    /// Loads an identity record.
    fn load_identity(&self, identity: &str) -> StoreResult<Option<IdentityRecord>>;

    /// Inserts an identity record. Returns false if the identity exists.
    fn insert_identity(&self, record: &IdentityRecord) -> StoreResult<bool>;

    /// Removes an identity record. Returns false if it did not exist.
    fn delete_identity(&self, identity: &str) -> StoreResult<bool>;
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    licenses: HashMap<ClientId, License>,
    identities: HashMap<String, IdentityRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LicenseBackend for MemoryBackend {
    fn load(&self, client_id: &ClientId) -> StoreResult<Option<License>> {
        Ok(self.lock().licenses.get(client_id).cloned())
    }

    fn compare_and_swap(&self, expected: Option<u64>, license: &License) -> StoreResult<bool> {
        let mut state = self.lock();
        let current = state.licenses.get(&license.client_id).map(|l| l.revision);
        if current != expected {
            return Ok(false);
        }
        state
            .licenses
            .insert(license.client_id.clone(), license.clone());
        Ok(true)
    }

    fn list(&self) -> StoreResult<Vec<License>> {
        let mut licenses: Vec<License> = self.lock().licenses.values().cloned().collect();
        licenses.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(licenses)
    }

    fn load_identity(&self, identity: &str) -> StoreResult<Option<IdentityRecord>> {
        Ok(self.lock().identities.get(identity).cloned())
    }

    fn insert_identity(&self, record: &IdentityRecord) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.identities.contains_key(&record.identity) {
            return Ok(false);
        }
        state
            .identities
            .insert(record.identity.clone(), record.clone());
        Ok(true)
    }
    fn delete_identity(&self, identity: &str) -> StoreResult<bool> {
        Ok(self.lock().identities.remove(identity).is_some())
    }
}
