//! Live session registry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tollgate_types::{ClientId, Session, SessionId};

/// Sessions issued by the guard, keyed by id.
///
/// A session is live while `now < expires_at` and it has been active within
/// the idle timeout.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now < session.expires_at && now - session.last_activity < self.idle_timeout
    }

    pub fn insert(&self, session: Session) {
        self.lock().insert(session.session_id, session);
    }

    /// Returns the session if it is live at `now`.
    pub fn get(&self, session_id: &SessionId, now: DateTime<Utc>) -> Option<Session> {
        self.lock()
            .get(session_id)
            .filter(|s| self.is_live(s, now))
            .cloned()
    }

    /// Marks the session active at `now` and returns it. Dead sessions are
    /// removed.
    pub fn touch(&self, session_id: &SessionId, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.lock();
        let live = sessions.get(session_id).is_some_and(|s| self.is_live(s, now));
        if !live {
            sessions.remove(session_id);
            return None;
        }
        let session = sessions.get_mut(session_id)?;
        session.last_activity = now;
        Some(session.clone())
    }

    /// Replaces a stored session, keeping it only if it was present.
    pub fn replace(&self, session: Session) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(&session.session_id) {
            Some(slot) => {
                *slot = session;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<Session> {
        self.lock().remove(session_id)
    }

    /// Removes every session of `client_id`. Returns how many were removed.
    pub fn remove_client(&self, client_id: &ClientId) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| &s.client_id != client_id);
        before - sessions.len()
    }

    /// Drops sessions that are no longer live. Returns how many were dropped.
    pub fn collect_garbage(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| self.is_live(s, now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
