//! The session persistence surface.

use jarvis_core::error::{JarvisError, Result};
use jarvis_core::types::{Session, SessionSummary};

/// Keyed collection of saved sessions.
///
/// Writes are last-writer-wins per session id: a `put` whose
/// `last_updated_at` is older than the stored copy is ignored.
pub trait SessionStore: Send + Sync {
    /// All stored sessions, most recently updated first.
    ///
    /// Ties on `last_updated_at` keep first-insertion order.
    fn list(&self) -> Result<Vec<Session>>;

    /// Fetch one session by id.
    fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Insert or overwrite a session.
    fn put(&self, session: &Session) -> Result<()>;

    /// Remove a session. Returns `false` if the id was unknown.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Fetch one session by id, failing with `NotFound` when it is absent.
    fn require(&self, id: &str) -> Result<Session> {
        self.get(id)?
            .ok_or_else(|| JarvisError::NotFound(id.to_string()))
    }

    /// Whether a session with this id is stored.
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Listing summaries in the same order as [`SessionStore::list`].
    fn summaries(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.list()?.iter().map(Session::summary).collect())
    }
}
