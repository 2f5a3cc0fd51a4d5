//! Striped per-client locks serializing the mutation path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tollgate_types::ClientId;

const STRIPES: usize = 64;

/// A fixed set of mutexes; a client always maps to the same stripe, so two
/// mutations of one client never run concurrently.
pub(crate) struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) fn lock(&self, client_id: &ClientId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        client_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
