use chrono::{DateTime, Utc};
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Sync bookkeeping (single row, id = 1)
    // =========================================================================

    /// When the last provider sync cycle completed, if ever.
    pub fn get_last_sync_at(&self) -> Result<Option<DateTime<Utc>>, String> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT last_sync_at FROM sync_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap_or(None);
        match raw {
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| format!("Corrupt last_sync_at '{}': {}", s, e)),
            None => Ok(None),
        }
    }

    /// Record a completed sync cycle and its outcome summary.
    pub fn set_last_sync(&self, at: DateTime<Utc>, result: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO sync_state (id, last_sync_at, last_result)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    last_sync_at = excluded.last_sync_at,
                    last_result = excluded.last_result",
                params![at.to_rfc3339(), result],
            )
            .map_err(|e| format!("Failed to record sync state: {e}"))?;
        Ok(())
    }
}
