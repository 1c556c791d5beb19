//! Process-lifetime session store.

use std::sync::Mutex;

use tracing::debug;

use jarvis_core::error::{JarvisError, Result};
use jarvis_core::types::Session;

use crate::store::SessionStore;

/// In-memory [`SessionStore`].
///
/// Sessions are kept in first-insertion order; overwrites keep the
/// original position so listing ties stay stable.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<Vec<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Session>>> {
        self.sessions
            .lock()
            .map_err(|e| JarvisError::Storage(format!("session store lock poisoned: {}", e)))
    }
}

impl SessionStore for MemorySessionStore {
    fn list(&self) -> Result<Vec<Session>> {
        let mut sessions = self.lock()?.clone();
        // Stable sort: equal timestamps keep insertion order.
        sessions.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(sessions)
    }

    fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.lock()?.iter().find(|s| s.id == id).cloned())
    }

    fn put(&self, session: &Session) -> Result<()> {
        let mut sessions = self.lock()?;
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) if existing.last_updated_at > session.last_updated_at => {
                debug!(session_id = %session.id, "Ignoring stale session write");
            }
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        Ok(sessions.len() != before)
    }
}
