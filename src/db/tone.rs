use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Tone profiles
    // =========================================================================

    /// Replace a user's tone profile wholesale. Re-analysis produces a
    /// complete new aggregate; nothing is merged with the old row.
    pub fn replace_tone_profile(&self, profile: &DbToneProfile) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO tone_profiles
                    (user_id, formality, avg_sentence_length, greetings, closings, analyzed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    formality = excluded.formality,
                    avg_sentence_length = excluded.avg_sentence_length,
                    greetings = excluded.greetings,
                    closings = excluded.closings,
                    analyzed_at = excluded.analyzed_at",
                params![
                    profile.user_id,
                    profile.formality,
                    profile.avg_sentence_length,
                    profile.greetings,
                    profile.closings,
                    profile.analyzed_at,
                ],
            )
            .map_err(|e| format!("Failed to replace tone profile for {}: {e}", profile.user_id))?;
        Ok(())
    }

    pub fn get_tone_profile(&self, user_id: &str) -> Result<Option<DbToneProfile>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT user_id, formality, avg_sentence_length, greetings, closings, analyzed_at
                 FROM tone_profiles WHERE user_id = ?1",
            )
            .map_err(|e| format!("Failed to prepare tone profile query: {e}"))?;
        let mut rows = stmt
            .query_map(params![user_id], |row| {
                Ok(DbToneProfile {
                    user_id: row.get(0)?,
                    formality: row.get(1)?,
                    avg_sentence_length: row.get(2)?,
                    greetings: row.get(3)?,
                    closings: row.get(4)?,
                    analyzed_at: row.get(5)?,
                })
            })
            .map_err(|e| format!("Failed to query tone profile: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| format!("Failed to read tone profile row: {e}"))?,
            )),
            None => Ok(None),
        }
    }
}
