use chrono::Utc;
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Communications
    // =========================================================================

    /// Insert or update a communication, keyed by `(communication_type,
    /// external_id)`. Delivering the same provider event twice updates the
    /// existing row instead of creating a duplicate. Identity columns
    /// (`lead_id`/`owner_id`) are only filled in, never cleared, so a late
    /// redelivery without attribution cannot detach an attributed row.
    ///
    /// Returns true if the communication was newly inserted (not updated).
    pub fn upsert_communication(&self, comm: &DbCommunication) -> Result<bool, String> {
        let existed: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM communications
                 WHERE communication_type = ?1 AND external_id = ?2)",
                params![comm.communication_type.as_str(), comm.external_id],
                |row| row.get(0),
            )
            .unwrap_or(true);

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO communications (
                    id, lead_id, owner_id, communication_type, direction, body,
                    subject, from_contact, to_contact, external_id, status,
                    delivery_status, error_code, is_read, recording_url,
                    duration_secs, metadata, archived, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                           ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                 ON CONFLICT(communication_type, external_id) DO UPDATE SET
                    lead_id = COALESCE(communications.lead_id, excluded.lead_id),
                    owner_id = COALESCE(communications.owner_id, excluded.owner_id),
                    body = excluded.body,
                    subject = COALESCE(excluded.subject, communications.subject),
                    status = excluded.status,
                    delivery_status = COALESCE(excluded.delivery_status, communications.delivery_status),
                    error_code = COALESCE(excluded.error_code, communications.error_code),
                    recording_url = COALESCE(excluded.recording_url, communications.recording_url),
                    duration_secs = COALESCE(excluded.duration_secs, communications.duration_secs),
                    metadata = COALESCE(excluded.metadata, communications.metadata),
                    updated_at = excluded.updated_at",
                params![
                    comm.id,
                    comm.lead_id,
                    comm.owner_id,
                    comm.communication_type.as_str(),
                    comm.direction.as_str(),
                    comm.body,
                    comm.subject,
                    comm.from_contact,
                    comm.to_contact,
                    comm.external_id,
                    comm.status,
                    comm.delivery_status,
                    comm.error_code,
                    comm.is_read as i32,
                    comm.recording_url,
                    comm.duration_secs,
                    comm.metadata,
                    comm.archived as i32,
                    comm.created_at,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert communication {}: {e}", comm.external_id))?;
        Ok(!existed)
    }

    /// Apply a delivery-status callback to an existing outbound message.
    /// Returns false when no row matches the external id: the callback
    /// arrived before (or without) the send record.
    pub fn update_delivery_status(
        &self,
        communication_type: CommunicationType,
        external_id: &str,
        status: &str,
        delivery_status: Option<&str>,
        error_code: Option<&str>,
    ) -> Result<bool, String> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE communications SET
                    status = ?1,
                    delivery_status = COALESCE(?2, delivery_status),
                    error_code = COALESCE(?3, error_code),
                    updated_at = ?4
                 WHERE communication_type = ?5 AND external_id = ?6",
                params![
                    status,
                    delivery_status,
                    error_code,
                    now,
                    communication_type.as_str(),
                    external_id,
                ],
            )
            .map_err(|e| format!("Failed to update delivery status for {external_id}: {e}"))?;
        Ok(rows > 0)
    }

    /// Look up a communication by its provider external id.
    pub fn get_communication_by_external_id(
        &self,
        communication_type: CommunicationType,
        external_id: &str,
    ) -> Result<Option<DbCommunication>, String> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COMM_COLUMNS} FROM communications
                 WHERE communication_type = ?1 AND external_id = ?2"
            ))
            .map_err(|e| format!("Failed to prepare external id query: {e}"))?;
        let mut rows = stmt
            .query_map(
                params![communication_type.as_str(), external_id],
                map_communication_row,
            )
            .map_err(|e| format!("Failed to query by external id: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| format!("Failed to read row: {e}"))?)),
            None => Ok(None),
        }
    }

    /// Look up a communication by primary key.
    pub fn get_communication(&self, id: &str) -> Result<Option<DbCommunication>, String> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COMM_COLUMNS} FROM communications WHERE id = ?1"
            ))
            .map_err(|e| format!("Failed to prepare communication query: {e}"))?;
        let mut rows = stmt
            .query_map(params![id], map_communication_row)
            .map_err(|e| format!("Failed to query communication: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| format!("Failed to read row: {e}"))?)),
            None => Ok(None),
        }
    }

    /// Recent non-archived communications, newest first.
    pub fn get_recent_communications(&self, limit: usize) -> Result<Vec<DbCommunication>, String> {
        self.query_communications(
            &format!(
                "SELECT {COMM_COLUMNS} FROM communications
                 WHERE archived = 0
                 ORDER BY created_at DESC
                 LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    /// Communications attached to a lead, newest first.
    pub fn get_communications_for_lead(
        &self,
        lead_id: &str,
        limit: usize,
    ) -> Result<Vec<DbCommunication>, String> {
        self.query_communications(
            &format!(
                "SELECT {COMM_COLUMNS} FROM communications
                 WHERE lead_id = ?1 AND archived = 0
                 ORDER BY created_at DESC
                 LIMIT ?2"
            ),
            params![lead_id, limit as i64],
        )
    }

    /// Communications attached to a property owner, newest first.
    pub fn get_communications_for_owner(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<DbCommunication>, String> {
        self.query_communications(
            &format!(
                "SELECT {COMM_COLUMNS} FROM communications
                 WHERE owner_id = ?1 AND archived = 0
                 ORDER BY created_at DESC
                 LIMIT ?2"
            ),
            params![owner_id, limit as i64],
        )
    }

    /// Mark a communication read. Returns false when the id is unknown.
    pub fn mark_communication_read(&self, id: &str) -> Result<bool, String> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE communications SET is_read = 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| format!("Failed to mark communication read: {e}"))?;
        Ok(rows > 0)
    }

    /// Soft-archive a communication. Rows are never hard-deleted.
    pub fn archive_communication(&self, id: &str) -> Result<bool, String> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE communications SET archived = 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| format!("Failed to archive communication: {e}"))?;
        Ok(rows > 0)
    }

    /// Count of non-archived rows, for /health.
    pub fn count_communications(&self) -> Result<i64, String> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM communications WHERE archived = 0",
                [],
                |row| row.get(0),
            )
            .map_err(|e| format!("Failed to count communications: {e}"))
    }

    fn query_communications(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DbCommunication>, String> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| format!("Failed to prepare communications query: {e}"))?;
        let rows = stmt
            .query_map(params, map_communication_row)
            .map_err(|e| format!("Failed to query communications: {e}"))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read communication row: {e}"))?);
        }
        Ok(results)
    }
}

/// Column list shared by every communications SELECT (20 columns).
const COMM_COLUMNS: &str = "id, lead_id, owner_id, communication_type, direction, body, subject,
    from_contact, to_contact, external_id, status, delivery_status, error_code,
    is_read, recording_url, duration_secs, metadata, archived, created_at, updated_at";

fn map_communication_row(row: &rusqlite::Row) -> rusqlite::Result<DbCommunication> {
    Ok(DbCommunication {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        owner_id: row.get(2)?,
        communication_type: CommunicationType::from_str_lossy(&row.get::<_, String>(3)?),
        direction: Direction::from_str_lossy(&row.get::<_, String>(4)?),
        body: row.get(5)?,
        subject: row.get(6)?,
        from_contact: row.get(7)?,
        to_contact: row.get(8)?,
        external_id: row.get(9)?,
        status: row.get(10)?,
        delivery_status: row.get(11)?,
        error_code: row.get(12)?,
        is_read: row.get::<_, i32>(13)? != 0,
        recording_url: row.get(14)?,
        duration_secs: row.get(15)?,
        metadata: row.get(16)?,
        archived: row.get::<_, i32>(17)? != 0,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    pub(crate) fn sample_comm(external_id: &str) -> DbCommunication {
        let now = Utc::now().to_rfc3339();
        DbCommunication {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: None,
            owner_id: None,
            communication_type: CommunicationType::Sms,
            direction: Direction::Inbound,
            body: "Hi, is the unit on Maple still available?".to_string(),
            subject: None,
            from_contact: "4045551234".to_string(),
            to_contact: "4045550100".to_string(),
            external_id: external_id.to_string(),
            status: "received".to_string(),
            delivery_status: None,
            error_code: None,
            is_read: false,
            recording_url: None,
            duration_secs: None,
            metadata: None,
            archived: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_upsert_is_idempotent_per_external_id() {
        let db = test_db();

        let comm = sample_comm("tx-msg-001");
        assert!(db.upsert_communication(&comm).expect("first upsert"));

        // Webhook redelivery: different row id, same (type, external_id)
        let mut retry = sample_comm("tx-msg-001");
        retry.body = comm.body.clone();
        assert!(!db.upsert_communication(&retry).expect("second upsert"));

        let count: i64 = db.count_communications().expect("count");
        assert_eq!(count, 1, "redelivery must not create a second row");
    }

    #[test]
    fn test_upsert_same_external_id_different_channel() {
        let db = test_db();

        let sms = sample_comm("shared-id");
        db.upsert_communication(&sms).expect("sms upsert");

        let mut call = sample_comm("shared-id");
        call.communication_type = CommunicationType::Call;
        call.status = "answered".to_string();
        assert!(db.upsert_communication(&call).expect("call upsert"));

        assert_eq!(db.count_communications().expect("count"), 2);
    }

    #[test]
    fn test_upsert_never_clears_attribution() {
        let db = test_db();

        let mut first = sample_comm("tx-msg-002");
        first.lead_id = Some("lead-1".to_string());
        db.upsert_communication(&first).expect("attributed upsert");

        // Redelivery without attribution
        let retry = sample_comm("tx-msg-002");
        db.upsert_communication(&retry).expect("bare upsert");

        let stored = db
            .get_communication_by_external_id(CommunicationType::Sms, "tx-msg-002")
            .expect("query")
            .expect("row exists");
        assert_eq!(stored.lead_id.as_deref(), Some("lead-1"));
    }

    #[test]
    fn test_update_delivery_status() {
        let db = test_db();

        let mut comm = sample_comm("tx-out-001");
        comm.direction = Direction::Outbound;
        comm.status = "sent".to_string();
        db.upsert_communication(&comm).expect("upsert");

        let matched = db
            .update_delivery_status(
                CommunicationType::Sms,
                "tx-out-001",
                "delivered",
                Some("delivered"),
                None,
            )
            .expect("update");
        assert!(matched);

        let stored = db
            .get_communication_by_external_id(CommunicationType::Sms, "tx-out-001")
            .expect("query")
            .expect("row exists");
        assert_eq!(stored.status, "delivered");
        assert_eq!(stored.delivery_status.as_deref(), Some("delivered"));
    }

    #[test]
    fn test_update_delivery_status_unknown_id() {
        let db = test_db();
        let matched = db
            .update_delivery_status(CommunicationType::Sms, "ghost", "delivered", None, None)
            .expect("update");
        assert!(!matched, "callback without a send record should report no match");
    }

    #[test]
    fn test_mark_read_and_archive() {
        let db = test_db();
        let comm = sample_comm("tx-msg-003");
        db.upsert_communication(&comm).expect("upsert");

        assert!(db.mark_communication_read(&comm.id).expect("mark read"));
        assert!(db.archive_communication(&comm.id).expect("archive"));

        let recent = db.get_recent_communications(10).expect("recent");
        assert!(recent.is_empty(), "archived rows drop out of listings");

        assert!(!db.mark_communication_read("nope").expect("unknown id"));
    }

    #[test]
    fn test_lead_scoped_listing() {
        let db = test_db();

        let mut a = sample_comm("m-1");
        a.lead_id = Some("lead-9".to_string());
        db.upsert_communication(&a).expect("upsert a");

        let b = sample_comm("m-2");
        db.upsert_communication(&b).expect("upsert b");

        let for_lead = db.get_communications_for_lead("lead-9", 10).expect("query");
        assert_eq!(for_lead.len(), 1);
        assert_eq!(for_lead[0].external_id, "m-1");
    }
}
