//! Session lifecycle: new, save, load, delete, list.
//!
//! [`SessionManager`] owns the current session and writes it into a
//! [`SessionStore`]. One manager exists per client connection; every
//! mutation goes through its methods.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use jarvis_core::types::{
    title_from_turns, InvestigationContext, Session, SessionSummary, Turn,
};
use jarvis_storage::SessionStore;

use crate::error::ChatError;

/// Format of creation-time session ids, e.g. `20250108_103000`.
const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where the current session stands relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has happened yet.
    NoActiveSession,
    /// The current session has changes the store has not seen.
    ActiveUnsaved,
    /// The store holds an up-to-date copy of the current session.
    ActiveSaved,
}

/// Owns the current session and its persistence.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    current: Option<Session>,
    saved: bool,
    title_max_chars: usize,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, title_max_chars: usize) -> Self {
        Self {
            store,
            current: None,
            saved: false,
            title_max_chars,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.current, self.saved) {
            (None, _) => SessionState::NoActiveSession,
            (Some(_), false) => SessionState::ActiveUnsaved,
            (Some(_), true) => SessionState::ActiveSaved,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.id.as_str())
    }

    /// Turn log of the current session; empty before the first interaction.
    pub fn turns(&self) -> &[Turn] {
        self.current.as_ref().map_or(&[], |s| s.turns.as_slice())
    }

    /// Snapshot of the current investigation context.
    pub fn context(&self) -> InvestigationContext {
        self.current
            .as_ref()
            .map(|s| s.context.clone())
            .unwrap_or_default()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a fresh session, saving the current one first if it has turns.
    ///
    /// Never fails: a failed auto-save is logged and the switch proceeds.
    pub fn new_session(&mut self) -> &Session {
        if self.turns().is_empty() {
            debug!("Discarding empty current session");
        } else if let Err(e) = self.save_current() {
            warn!(error = %e, "Auto-save before new session failed");
        }
        self.start_fresh()
    }

    /// Write the current session into the store.
    ///
    /// No-op when the turn log is empty. The title is derived on the first
    /// save only.
    pub fn save_current(&mut self) -> Result<(), ChatError> {
        let title_max_chars = self.title_max_chars;
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        if session.turns.is_empty() {
            return Ok(());
        }

        if session.title.is_none() {
            session.title = Some(title_from_turns(&session.turns, title_max_chars));
        }
        session.touch(Utc::now());

        self.store.put(session)?;
        self.saved = true;
        debug!(
            session_id = %session.id,
            turns = session.turns.len(),
            "Session saved"
        );
        Ok(())
    }

    /// Make a stored session current. Loading counts as activity.
    pub fn load(&mut self, id: &str) -> Result<&Session, ChatError> {
        let mut session = self.store.require(id)?;

        session.touch(Utc::now());
        self.store.put(&session)?;

        info!(session_id = %session.id, turns = session.turns.len(), "Session loaded");
        self.saved = true;
        Ok(&*self.current.insert(session))
    }

    /// Remove a session from the store, or discard the current one.
    ///
    /// Deleting the current session starts a fresh one in its place, without
    /// auto-saving the deleted one back. The current session may be deleted
    /// before it was ever saved.
    pub fn delete(&mut self, id: &str) -> Result<(), ChatError> {
        let is_current = self.current_id() == Some(id);
        let removed = self.store.delete(id)?;
        if !removed && !is_current {
            return Err(ChatError::SessionNotFound(id.to_string()));
        }
        info!(session_id = %id, stored = removed, "Session deleted");

        if is_current {
            // The deleted id still counts as taken while the fresh id is picked.
            self.start_fresh();
        }
        Ok(())
    }

    /// Stored sessions, most recently active first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, ChatError> {
        Ok(self.store.summaries()?)
    }

    /// Append a turn to the current session, creating one if needed.
    pub fn append_turn(&mut self, turn: Turn) {
        let session = self.ensure_current();
        session.turns.push(turn);
        session.touch(Utc::now());
        self.saved = false;
    }

    /// Replace the current investigation context.
    pub fn set_context(&mut self, context: InvestigationContext) {
        let session = self.ensure_current();
        if session.context != context {
            session.context = context;
            session.touch(Utc::now());
            self.saved = false;
        }
    }

    /// Empty the turn log and context while keeping the session id.
    ///
    /// The stored copy, if any, is left as it was.
    pub fn clear_history(&mut self) {
        let session = self.ensure_current();
        session.turns.clear();
        session.context = InvestigationContext::default();
        session.touch(Utc::now());
        info!(session_id = %session.id, "Session history cleared");
        self.saved = false;
    }

    fn ensure_current(&mut self) -> &mut Session {
        let session = match self.current.take() {
            Some(session) => session,
            None => self.fresh_session(),
        };
        self.current.insert(session)
    }

    fn start_fresh(&mut self) -> &Session {
        let session = self.fresh_session();
        self.current.insert(session)
    }

    fn fresh_session(&mut self) -> Session {
        let now = Utc::now();
        let id = self.unique_id(now.with_timezone(&Local));
        info!(session_id = %id, "New session started");
        self.saved = false;
        Session::new(id, now)
    }

    /// Creation-time id, suffixed `_2`, `_3`, ... while already taken.
    fn unique_id(&self, now: DateTime<Local>) -> String {
        let base = now.format(SESSION_ID_FORMAT).to_string();
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.id_taken(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    fn id_taken(&self, id: &str) -> bool {
        if self.current_id() == Some(id) {
            return true;
        }
        self.store.contains(id).unwrap_or_else(|e| {
            warn!(error = %e, session_id = %id, "Could not check session id");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_core::types::{InvestigationKind, Role, DEFAULT_SESSION_TITLE};
    use jarvis_storage::MemorySessionStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemorySessionStore::new()), 50)
    }

    fn texts(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    // ---- State machine ----

    #[test]
    fn test_initial_state() {
        let mgr = manager();
        assert_eq!(mgr.state(), SessionState::NoActiveSession);
        assert!(mgr.current().is_none());
        assert!(mgr.turns().is_empty());
        assert!(mgr.context().is_empty());
    }

    #[test]
    fn test_append_creates_unsaved_session() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("ping"));
        assert_eq!(mgr.state(), SessionState::ActiveUnsaved);
        assert_eq!(texts(mgr.turns()), vec!["ping"]);
    }

    #[test]
    fn test_save_then_append_is_dirty() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("ping"));
        mgr.save_current().unwrap();
        assert_eq!(mgr.state(), SessionState::ActiveSaved);

        mgr.append_turn(Turn::assistant("pong"));
        assert_eq!(mgr.state(), SessionState::ActiveUnsaved);
    }

    // ---- Save ----

    #[test]
    fn test_save_empty_is_noop() {
        let mut mgr = manager();
        mgr.new_session();
        mgr.save_current().unwrap();
        assert!(mgr.list().unwrap().is_empty());
        assert_eq!(mgr.state(), SessionState::ActiveUnsaved);
    }

    #[test]
    fn test_save_without_session_is_noop() {
        let mut mgr = manager();
        mgr.save_current().unwrap();
        assert_eq!(mgr.state(), SessionState::NoActiveSession);
    }

    #[test]
    fn test_title_set_once_on_first_save() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("first question"));
        mgr.save_current().unwrap();
        mgr.append_turn(Turn::user("second question"));
        mgr.save_current().unwrap();

        let id = mgr.current_id().unwrap().to_string();
        let stored = mgr.store().get(&id).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("first question"));
        assert_eq!(stored.turns.len(), 2);
    }

    #[test]
    fn test_save_advances_last_updated() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("ping"));
        let before = mgr.current().unwrap().last_updated_at;
        mgr.save_current().unwrap();
        assert!(mgr.current().unwrap().last_updated_at >= before);
    }

    // ---- New session ----

    #[test]
    fn test_new_session_autosaves_previous() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("ping"));
        let first_id = mgr.current_id().unwrap().to_string();

        let second_id = mgr.new_session().id.clone();
        assert_ne!(first_id, second_id);
        assert!(mgr.turns().is_empty());
        assert!(mgr.context().is_empty());
        assert!(mgr.store().contains(&first_id).unwrap());
    }

    #[test]
    fn test_new_session_discards_empty_previous() {
        let mut mgr = manager();
        mgr.new_session();
        mgr.new_session();
        assert!(mgr.list().unwrap().is_empty());
    }

    #[test]
    fn test_new_session_ids_unique_within_same_second() {
        let mut mgr = manager();
        let mut ids = Vec::new();
        for i in 0..4 {
            mgr.append_turn(Turn::user(format!("q{}", i)));
            ids.push(mgr.current_id().unwrap().to_string());
            mgr.new_session();
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_unique_id_suffixes() {
        let mgr = manager();
        let now = Local::now();
        let base = now.format(SESSION_ID_FORMAT).to_string();
        mgr.store()
            .put(&Session::new(base.clone(), Utc::now()))
            .unwrap();
        mgr.store()
            .put(&Session::new(format!("{}_2", base), Utc::now()))
            .unwrap();
        assert_eq!(mgr.unique_id(now), format!("{}_3", base));
    }

    // ---- Load ----

    #[test]
    fn test_round_trip() {
        let mut mgr = manager();
        mgr.new_session();
        let first_id = mgr.current_id().unwrap().to_string();
        mgr.append_turn(Turn::user("ping"));
        mgr.append_turn(Turn::assistant("pong"));
        mgr.save_current().unwrap();

        mgr.new_session();
        assert_ne!(mgr.current_id(), Some(first_id.as_str()));

        let loaded = mgr.load(&first_id).unwrap();
        assert_eq!(texts(&loaded.turns), vec!["ping", "pong"]);
        assert_eq!(loaded.title.as_deref(), Some("ping"));
        assert_eq!(mgr.state(), SessionState::ActiveSaved);
    }

    #[test]
    fn test_load_unknown_is_not_found_and_keeps_state() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("keep me"));
        let id = mgr.current_id().unwrap().to_string();

        let err = mgr.load("19990101_000000").unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(ref missing) if missing == "19990101_000000"));
        assert_eq!(mgr.current_id(), Some(id.as_str()));
        assert_eq!(texts(mgr.turns()), vec!["keep me"]);
    }

    #[test]
    fn test_load_restores_context() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("look at incident 12345"));
        mgr.set_context(InvestigationContext {
            active_incident_id: Some("12345".into()),
            active_deployment_ref: None,
            active_investigation_kind: Some(InvestigationKind::IncidentAnalysis),
        });
        let id = mgr.current_id().unwrap().to_string();
        mgr.new_session();

        mgr.load(&id).unwrap();
        assert_eq!(mgr.context().active_incident_id.as_deref(), Some("12345"));
    }

    #[test]
    fn test_load_refreshes_activity_order() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("older"));
        let older = mgr.current_id().unwrap().to_string();
        mgr.new_session();
        std::thread::sleep(std::time::Duration::from_millis(5));
        mgr.append_turn(Turn::user("newer"));
        mgr.new_session();

        assert_eq!(mgr.list().unwrap()[0].title, "newer");
        std::thread::sleep(std::time::Duration::from_millis(5));
        mgr.load(&older).unwrap();
        assert_eq!(mgr.list().unwrap()[0].id, older);
    }

    // ---- Delete ----

    #[test]
    fn test_delete_other_session() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("a"));
        let a = mgr.current_id().unwrap().to_string();
        mgr.new_session();
        mgr.append_turn(Turn::user("b"));
        let b = mgr.current_id().unwrap().to_string();

        mgr.delete(&a).unwrap();
        assert_eq!(mgr.current_id(), Some(b.as_str()));
        assert!(!mgr.store().contains(&a).unwrap());
    }

    #[test]
    fn test_delete_current_starts_fresh() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("doomed"));
        mgr.save_current().unwrap();
        let id = mgr.current_id().unwrap().to_string();

        mgr.delete(&id).unwrap();
        assert!(mgr.turns().is_empty());
        assert_eq!(mgr.state(), SessionState::ActiveUnsaved);
        assert!(!mgr.store().contains(&id).unwrap());
        // Not written back by the implicit new session.
        assert!(mgr.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unsaved_current_starts_fresh() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("secret"));
        let id = mgr.current_id().unwrap().to_string();

        mgr.delete(&id).unwrap();
        assert!(mgr.turns().is_empty());
        assert_ne!(mgr.current_id(), Some(id.as_str()));

        // The next save has nothing to write.
        mgr.save_current().unwrap();
        assert!(mgr.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_is_not_found() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("stay"));
        let id = mgr.current_id().unwrap().to_string();
        let err = mgr.delete("nope").unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
        assert_eq!(mgr.current_id(), Some(id.as_str()));
    }

    // ---- Clear / list ----

    #[test]
    fn test_clear_history_keeps_id_and_store() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("ping"));
        mgr.set_context(InvestigationContext {
            active_incident_id: Some("7".into()),
            ..Default::default()
        });
        mgr.save_current().unwrap();
        let id = mgr.current_id().unwrap().to_string();

        mgr.clear_history();
        assert_eq!(mgr.current_id(), Some(id.as_str()));
        assert!(mgr.turns().is_empty());
        assert!(mgr.context().is_empty());
        assert_eq!(mgr.store().get(&id).unwrap().unwrap().turns.len(), 1);
    }

    #[test]
    fn test_list_summaries() {
        let mut mgr = manager();
        mgr.append_turn(Turn::user("first"));
        mgr.append_turn(Turn::assistant("reply"));
        mgr.save_current().unwrap();

        let list = mgr.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "first");
        assert_eq!(list[0].message_count, 2);
    }

    #[test]
    fn test_assistant_only_session_gets_default_title() {
        let mut mgr = manager();
        mgr.append_turn(Turn::assistant("welcome"));
        mgr.save_current().unwrap();
        assert_eq!(mgr.list().unwrap()[0].title, DEFAULT_SESSION_TITLE);
        assert_eq!(mgr.turns()[0].role, Role::Assistant);
    }
}
