use chrono::Utc;
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Timelines (append-only audit trail)
    // =========================================================================

    pub fn append_lead_timeline(
        &self,
        lead_id: &str,
        entry_type: &str,
        summary: &str,
    ) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO lead_timeline (id, lead_id, entry_type, summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    lead_id,
                    entry_type,
                    summary,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to append lead timeline for {lead_id}: {e}"))?;
        Ok(())
    }

    pub fn append_work_order_timeline(
        &self,
        work_order_id: &str,
        entry_type: &str,
        summary: &str,
    ) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO work_order_timeline (id, work_order_id, entry_type, summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    work_order_id,
                    entry_type,
                    summary,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to append work order timeline for {work_order_id}: {e}"))?;
        Ok(())
    }

    pub fn get_lead_timeline(&self, lead_id: &str, limit: usize) -> Result<Vec<DbTimelineEntry>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, lead_id, entry_type, summary, created_at
                 FROM lead_timeline
                 WHERE lead_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| format!("Failed to prepare timeline query: {e}"))?;
        let rows = stmt
            .query_map(params![lead_id, limit as i64], map_timeline_row)
            .map_err(|e| format!("Failed to query timeline: {e}"))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read timeline row: {e}"))?);
        }
        Ok(results)
    }
}

fn map_timeline_row(row: &rusqlite::Row) -> rusqlite::Result<DbTimelineEntry> {
    Ok(DbTimelineEntry {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        entry_type: row.get(2)?,
        summary: row.get(3)?,
        created_at: row.get(4)?,
    })
}
