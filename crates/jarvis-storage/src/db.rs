//! SQLite connection for the session store.
//!
//! One connection per process, shared behind a `Mutex`. File databases run
//! in WAL mode with a busy timeout so a second `jarvis` process pointed at
//! the same data directory waits for the lock instead of failing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use jarvis_core::config::StorageConfig;
use jarvis_core::error::{JarvisError, Result};

use crate::migrations;

/// Lock wait used when no storage config is at hand.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// The migrated session database.
pub struct Database {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
}

impl Database {
    /// Open the configured database file inside `data_dir`, creating the
    /// directory when missing.
    pub fn open_in(data_dir: &Path, config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Self::open_with_timeout(
            &data_dir.join(&config.database_file),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            JarvisError::Storage(format!("Cannot open {}: {}", path.display(), e))
        })?;
        conn.busy_timeout(busy_timeout).map_err(pragma_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(pragma_err)?;

        let db = Self::migrated(conn, Some(path.to_path_buf()))?;
        info!(
            path = %path.display(),
            busy_timeout_ms = busy_timeout.as_millis() as u64,
            "Session database ready"
        );
        Ok(db)
    }

    /// A private database that disappears with the value.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| JarvisError::Storage(format!("Cannot open in-memory db: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(pragma_err)?;
        Self::migrated(conn, None)
    }

    fn migrated(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        debug!(version = migrations::schema_version(&conn)?, "Schema up to date");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.with_conn(migrations::schema_version)
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| JarvisError::Storage("session database lock poisoned".to_string()))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

fn pragma_err(e: rusqlite::Error) -> JarvisError {
    JarvisError::Storage(format!("Failed to configure connection: {}", e))
}
