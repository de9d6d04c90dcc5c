//! SQLite-backed communications store.
//!
//! The database lives at `~/.frontdesk/frontdesk.db` and is the single
//! source of truth for the inbox: communications, contacts, phone
//! assignments, notifications, timelines, snippets, and tone profiles.
//! Writes all flow through `CommsDb`; HTTP handlers and the sync loop
//! share one connection behind a lock.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub mod assignments;
pub mod communications;
pub mod contacts;
pub mod notifications;
pub mod roles;
pub mod snippets;
pub mod sync_state;
pub mod timeline;
pub mod tone;

pub struct CommsDb {
    conn: Connection,
}

impl CommsDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Self) -> Result<T, String>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("Failed to begin transaction: {e}"))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| format!("Failed to commit transaction: {e}"))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `~/.frontdesk/frontdesk.db` and
    /// apply pending migrations.
    pub fn open() -> Result<Self, String> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a database at an explicit path. Useful for testing and the
    /// `--db` override.
    pub fn open_at(path: PathBuf) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create db dir: {e}"))?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| format!("Failed to open db: {e}"))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| format!("Failed to enable WAL: {e}"))?;

        crate::migrations::run_migrations(&conn)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| format!("Failed to enable foreign keys: {e}"))?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.frontdesk/frontdesk.db`.
    fn db_path() -> Result<PathBuf, String> {
        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        Ok(home.join(".frontdesk").join("frontdesk.db"))
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM communications", [], |row| row.get(0))
            .expect("communications table should exist");
        assert_eq!(count, 0);

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))
            .expect("leads table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_idempotent_schema_application() {
        // Opening the same DB twice should not error
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("idempotent.db");

        let _db1 = CommsDb::open_at(path.clone()).expect("first open");
        let _db2 = CommsDb::open_at(path).expect("second open should not fail");
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = test_db();

        let result: Result<(), String> = db.with_transaction(|db| {
            db.conn
                .execute(
                    "INSERT INTO leads (id, name, status, created_at, updated_at)
                     VALUES ('l1', 'Pat', 'new', '2026-01-01', '2026-01-01')",
                    [],
                )
                .map_err(|e| e.to_string())?;
            Err("abort".to_string())
        });
        assert!(result.is_err());

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))
            .expect("query");
        assert_eq!(count, 0, "rolled-back insert should not persist");
    }
}
