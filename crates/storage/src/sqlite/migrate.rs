use chrono::Utc;
use rusqlite::{Connection, params};

/// Brings the mirror schema up to date. Safe to run on every open.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    fn is_applied(conn: &Connection, version: i64) -> rusqlite::Result<bool> {
        let mut stmt = conn.prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?;
        stmt.exists(params![version])
    }

    conn.execute_batch(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )?;

    // Version 1: key-value mirror.
    if !is_applied(conn, 1)? {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            r"
                CREATE TABLE IF NOT EXISTS kv_mirror (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )?;
        tx.execute(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
            params![1_i64, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
    }

    Ok(())
}
