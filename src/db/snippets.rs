use chrono::Utc;
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Snippets (reusable reply templates, ranked by use count)
    // =========================================================================

    /// Insert or update a snippet by `(user_id, shortcut)`. Updates keep
    /// the accumulated use count.
    pub fn upsert_snippet(&self, snippet: &DbSnippet) -> Result<(), String> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO snippets (id, user_id, shortcut, content, use_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id, shortcut) DO UPDATE SET
                    content = excluded.content,
                    updated_at = excluded.updated_at",
                params![
                    snippet.id,
                    snippet.user_id,
                    snippet.shortcut,
                    snippet.content,
                    snippet.use_count,
                    snippet.created_at,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert snippet {}: {e}", snippet.shortcut))?;
        Ok(())
    }

    /// Snippets for a user, most used first, then alphabetical shortcut.
    pub fn get_snippets(&self, user_id: &str) -> Result<Vec<DbSnippet>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, shortcut, content, use_count, created_at, updated_at
                 FROM snippets
                 WHERE user_id = ?1
                 ORDER BY use_count DESC, shortcut",
            )
            .map_err(|e| format!("Failed to prepare snippets query: {e}"))?;
        let rows = stmt
            .query_map(params![user_id], map_snippet_row)
            .map_err(|e| format!("Failed to query snippets: {e}"))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read snippet row: {e}"))?);
        }
        Ok(results)
    }

    /// Record a use: bumps `use_count` and returns the snippet content.
    pub fn use_snippet(&self, id: &str) -> Result<Option<DbSnippet>, String> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE snippets SET use_count = use_count + 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| format!("Failed to bump snippet use count: {e}"))?;
        if rows == 0 {
            return Ok(None);
        }
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, shortcut, content, use_count, created_at, updated_at
                 FROM snippets WHERE id = ?1",
            )
            .map_err(|e| format!("Failed to prepare snippet query: {e}"))?;
        let mut result_rows = stmt
            .query_map(params![id], map_snippet_row)
            .map_err(|e| format!("Failed to query snippet: {e}"))?;
        match result_rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| format!("Failed to read snippet row: {e}"))?,
            )),
            None => Ok(None),
        }
    }
}

fn map_snippet_row(row: &rusqlite::Row) -> rusqlite::Result<DbSnippet> {
    Ok(DbSnippet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        shortcut: row.get(2)?,
        content: row.get(3)?,
        use_count: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
