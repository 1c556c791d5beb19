//! SQLite-backed session repository.
//!
//! Session metadata lives in `sessions`; each turn is one JSON row in
//! `session_turns`, ordered by position.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use jarvis_core::error::{JarvisError, Result};
use jarvis_core::types::{
    InvestigationContext, Session, SessionSummary, Turn, DEFAULT_SESSION_TITLE,
};

use crate::db::Database;
use crate::store::SessionStore;

/// Durable [`SessionStore`] on top of [`Database`].
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SessionStore for SessionRepository {
    fn list(&self) -> Result<Vec<Session>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, context, created_at, last_updated_at
                     FROM sessions ORDER BY last_updated_at DESC, seq ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], row_to_header)
                .map_err(storage_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(storage_err)?;

            rows.into_iter()
                .map(|header| header.into_session(conn))
                .collect()
        })
    }

    fn get(&self, id: &str) -> Result<Option<Session>> {
        self.db.with_conn(|conn| {
            let header = conn
                .query_row(
                    "SELECT id, title, context, created_at, last_updated_at
                     FROM sessions WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_header,
                )
                .optional()
                .map_err(storage_err)?;
            header.map(|h| h.into_session(conn)).transpose()
        })
    }

    fn put(&self, session: &Session) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;

            let stored: Option<i64> = tx
                .query_row(
                    "SELECT last_updated_at FROM sessions WHERE id = ?1",
                    rusqlite::params![session.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            let incoming = session.last_updated_at.timestamp_micros();
            if stored.is_some_and(|stored| stored > incoming) {
                debug!(session_id = %session.id, "Ignoring stale session write");
                return Ok(());
            }

            tx.execute(
                "INSERT INTO sessions (id, title, context, message_count, created_at, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET
                    title = excluded.title,
                    context = excluded.context,
                    message_count = excluded.message_count,
                    last_updated_at = excluded.last_updated_at",
                rusqlite::params![
                    session.id,
                    session.title,
                    serde_json::to_string(&session.context)?,
                    session.turns.len() as i64,
                    session.created_at.timestamp_micros(),
                    incoming,
                ],
            )
            .map_err(|e| JarvisError::Storage(format!("Failed to save session: {}", e)))?;

            tx.execute(
                "DELETE FROM session_turns WHERE session_id = ?1",
                rusqlite::params![session.id],
            )
            .map_err(storage_err)?;

            for (position, turn) in session.turns.iter().enumerate() {
                tx.execute(
                    "INSERT INTO session_turns (session_id, position, role, body)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        session.id,
                        position as i64,
                        turn.role.as_str(),
                        serde_json::to_string(turn)?,
                    ],
                )
                .map_err(|e| JarvisError::Storage(format!("Failed to save turn: {}", e)))?;
            }

            tx.commit().map_err(storage_err)?;
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id])
                .map_err(storage_err)?;
            Ok(removed > 0)
        })
    }

    fn contains(&self, id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sessions WHERE id = ?1)",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .map_err(storage_err)
        })
    }

    /// Reads header columns only; turn rows are never touched.
    fn summaries(&self) -> Result<Vec<SessionSummary>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, message_count, created_at, last_updated_at
                     FROM sessions ORDER BY last_updated_at DESC, seq ASC",
                )
                .map_err(storage_err)?;
            let summaries = stmt
                .query_map([], row_to_summary)
                .map_err(storage_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(storage_err)?;
            Ok(summaries)
        })
    }
}

/// Session row without its turns.
struct SessionHeader {
    id: String,
    title: Option<String>,
    context: String,
    created_at: i64,
    last_updated_at: i64,
}

impl SessionHeader {
    fn into_session(self, conn: &Connection) -> Result<Session> {
        let context: InvestigationContext = serde_json::from_str(&self.context)?;
        let turns = load_turns(conn, &self.id)?;
        Ok(Session {
            id: self.id,
            title: self.title,
            turns,
            context,
            created_at: from_micros(self.created_at),
            last_updated_at: from_micros(self.last_updated_at),
        })
    }
}

fn row_to_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionHeader> {
    Ok(SessionHeader {
        id: row.get(0)?,
        title: row.get(1)?,
        context: row.get(2)?,
        created_at: row.get(3)?,
        last_updated_at: row.get(4)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    let title: Option<String> = row.get(1)?;
    let message_count: i64 = row.get(2)?;
    Ok(SessionSummary {
        id: row.get(0)?,
        title: title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string()),
        message_count: usize::try_from(message_count).unwrap_or_default(),
        created_at: from_micros(row.get(3)?),
        last_updated_at: from_micros(row.get(4)?),
    })
}

fn load_turns(conn: &Connection, session_id: &str) -> Result<Vec<Turn>> {
    let mut stmt = conn
        .prepare("SELECT body FROM session_turns WHERE session_id = ?1 ORDER BY position ASC")
        .map_err(storage_err)?;
    let bodies = stmt
        .query_map(rusqlite::params![session_id], |row| row.get::<_, String>(0))
        .map_err(storage_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage_err)?;

    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(JarvisError::from))
        .collect()
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

fn storage_err(e: rusqlite::Error) -> JarvisError {
    JarvisError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jarvis_core::types::{Artifact, InvestigationKind};

    fn make_repo() -> SessionRepository {
        SessionRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn make_session(id: &str, offset_secs: i64) -> Session {
        let now = Utc::now() + Duration::seconds(offset_secs);
        let mut session = Session::new(id, now);
        session.title = Some(format!("title {}", id));
        session.turns.push(Turn::user("ping"));
        session.turns.push(Turn::assistant("pong").with_latency_ms(42));
        session
    }

    #[test]
    fn test_put_and_get_round_trip() {
        let repo = make_repo();
        let mut session = make_session("20250108_103000", 0);
        session.context = InvestigationContext {
            active_incident_id: Some("INC-12345".into()),
            active_deployment_ref: Some("deploy-v1.2.3".into()),
            active_investigation_kind: Some(InvestigationKind::IncidentAnalysis),
        };
        repo.put(&session).unwrap();

        let loaded = repo.get("20250108_103000").unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("title 20250108_103000"));
        assert_eq!(loaded.context, session.context);
        assert_eq!(loaded.turns, session.turns);
        assert_eq!(
            loaded.last_updated_at.timestamp_micros(),
            session.last_updated_at.timestamp_micros()
        );
    }

    #[test]
    fn test_get_unknown_is_none() {
        let repo = make_repo();
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_turns() {
        let repo = make_repo();
        let mut session = make_session("s1", 0);
        repo.put(&session).unwrap();

        session.turns.push(Turn::user("follow-up"));
        session.touch(session.last_updated_at + Duration::seconds(1));
        repo.put(&session).unwrap();

        let loaded = repo.get("s1").unwrap().unwrap();
        assert_eq!(loaded.turns.len(), 3);
        assert_eq!(loaded.turns[2].text, "follow-up");
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_put_is_ignored() {
        let repo = make_repo();
        repo.put(&make_session("s1", 60)).unwrap();

        let mut stale = make_session("s1", 0);
        stale.turns.clear();
        repo.put(&stale).unwrap();

        assert_eq!(repo.get("s1").unwrap().unwrap().turns.len(), 2);
    }

    #[test]
    fn test_list_most_recent_first() {
        let repo = make_repo();
        repo.put(&make_session("session1", -7200)).unwrap();
        repo.put(&make_session("session3", 0)).unwrap();
        repo.put(&make_session("session2", -1800)).unwrap();

        let ids: Vec<String> = repo.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["session3", "session2", "session1"]);
    }

    #[test]
    fn test_list_ties_keep_insertion_order() {
        let repo = make_repo();
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            repo.put(&Session::new(id, now)).unwrap();
        }
        let ids: Vec<String> = repo.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_removes_session_and_turns() {
        let repo = make_repo();
        repo.put(&make_session("s1", 0)).unwrap();
        assert!(repo.delete("s1").unwrap());
        assert!(repo.get("s1").unwrap().is_none());
        assert!(!repo.delete("s1").unwrap());
    }

    #[test]
    fn test_artifacts_survive_round_trip() {
        let repo = make_repo();
        let mut session = make_session("s1", 0);
        session.turns.push(Turn::assistant("here is the chart").with_artifacts(vec![
            Artifact {
                kind: "plotly_figure".into(),
                payload: serde_json::json!({"data": [{"y": [1, 2, 3]}]}),
                description: Some("cpu".into()),
            },
        ]));
        repo.put(&session).unwrap();

        let loaded = repo.get("s1").unwrap().unwrap();
        assert_eq!(loaded.turns[2].artifacts.len(), 1);
        assert_eq!(loaded.turns[2].artifacts[0].kind, "plotly_figure");
    }

    #[test]
    fn test_summaries_message_count() {
        let repo = make_repo();
        repo.put(&make_session("s1", 0)).unwrap();
        let summaries = repo.summaries().unwrap();
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summaries[0].title, "title s1");
    }

    #[test]
    fn test_summaries_match_full_listing() {
        let repo = make_repo();
        repo.put(&make_session("older", -60)).unwrap();
        let mut untitled = make_session("newer", 0);
        untitled.title = None;
        untitled.turns.push(Turn::user("third"));
        repo.put(&untitled).unwrap();

        let summaries = repo.summaries().unwrap();
        let expected: Vec<SessionSummary> =
            repo.list().unwrap().iter().map(Session::summary).collect();
        assert_eq!(summaries, expected);
        assert_eq!(summaries[0].title, DEFAULT_SESSION_TITLE);
        assert_eq!(summaries[0].message_count, 3);
    }

    #[test]
    fn test_summaries_skip_turn_rows() {
        let repo = make_repo();
        repo.put(&make_session("s1", 0)).unwrap();
        // Corrupt turn bodies only break full loads.
        repo.db
            .with_conn(|conn| {
                conn.execute("UPDATE session_turns SET body = 'not json'", [])
                    .map_err(storage_err)
            })
            .unwrap();

        assert!(repo.get("s1").is_err());
        assert_eq!(repo.summaries().unwrap()[0].message_count, 2);
    }

    #[test]
    fn test_contains() {
        let repo = make_repo();
        repo.put(&make_session("s1", 0)).unwrap();
        assert!(repo.contains("s1").unwrap());
        assert!(!repo.contains("s2").unwrap());
    }

    #[test]
    fn test_file_backed_repository_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let repo = SessionRepository::new(Arc::new(Database::open(&path).unwrap()));
            repo.put(&make_session("s1", 0)).unwrap();
        }
        let repo = SessionRepository::new(Arc::new(Database::open(&path).unwrap()));
        assert_eq!(repo.get("s1").unwrap().unwrap().turns.len(), 2);
    }
}
