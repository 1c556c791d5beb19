//! Database schema migrations.
//!
//! Applies the session schema: the sessions table, the per-session turn
//! log, and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use jarvis_core::error::JarvisError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), JarvisError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| JarvisError::Storage(format!("Failed to create migrations table: {}", e)))?;

    if schema_version(conn)? < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: sessions");
    }

    Ok(())
}

/// Highest applied migration, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, JarvisError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| JarvisError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: sessions and their turn logs.
///
/// `seq` records first-insertion order and breaks `last_updated_at` ties
/// when listing. Timestamps are epoch microseconds.
fn apply_v1(conn: &Connection) -> Result<(), JarvisError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            title           TEXT,
            context         TEXT NOT NULL DEFAULT '{}',
            message_count   INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_last_updated
            ON sessions (last_updated_at DESC, seq ASC);

        CREATE TABLE IF NOT EXISTS session_turns (
            session_id  TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            body        TEXT NOT NULL,
            PRIMARY KEY (session_id, position)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'sessions');
        ",
    )
    .map_err(|e| JarvisError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_session_id_is_unique() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, created_at, last_updated_at) VALUES ('s1', 1, 1)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO sessions (id, created_at, last_updated_at) VALUES ('s1', 2, 2)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_turn_role_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, created_at, last_updated_at) VALUES ('s1', 1, 1)",
            [],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO session_turns (session_id, position, role, body)
             VALUES ('s1', 0, 'system', '{}')",
            [],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_turns_cascade_on_session_delete() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, created_at, last_updated_at) VALUES ('s1', 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session_turns (session_id, position, role, body)
             VALUES ('s1', 0, 'user', '{}')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM sessions WHERE id = 's1'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_turns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
