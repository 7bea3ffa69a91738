use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::repository::{KeyValueStore, Mirror, MirrorError};

mod migrate;

/// Key-value mirror persisted in a single `SQLite` table.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the file cannot be opened or if setup
    /// pragmas or migrations fail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteInitError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    /// Private in-memory database; contents vanish with the last clone.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migrations fail.
    pub fn open_in_memory() -> Result<Self, SqliteInitError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteInitError> {
        migrate::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<rusqlite::Error> for MirrorError {
    fn from(err: rusqlite::Error) -> Self {
        MirrorError::Connection(err.to_string())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_mirror WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        let conn = self.lock();
        conn.execute(
            r"
                INSERT INTO kv_mirror (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
            ",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        let conn = self.lock();
        conn.execute("DELETE FROM kv_mirror WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl Mirror {
    /// Build a `Mirror` backed by the `SQLite` file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or
    /// migrated.
    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self, SqliteInitError> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(Arc::new(store)))
    }
}
