use chrono::Utc;
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Leads
    // =========================================================================

    /// Insert or update a lead. Phone numbers are stored normalized to
    /// their last ten digits so inbound lookups are a single equality.
    pub fn upsert_lead(&self, lead: &DbLead) -> Result<(), String> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO leads (id, name, email, phone, status, archived, created_at, updated_at)
                 VALUES (?1, ?2, LOWER(?3), ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = COALESCE(excluded.email, leads.email),
                    phone = COALESCE(excluded.phone, leads.phone),
                    status = excluded.status,
                    archived = excluded.archived,
                    updated_at = excluded.updated_at",
                params![
                    lead.id,
                    lead.name,
                    lead.email,
                    lead.phone.as_deref().map(crate::resolver::normalize_phone),
                    lead.status,
                    lead.archived as i32,
                    lead.created_at,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert lead {}: {e}", lead.id))?;
        Ok(())
    }

    /// Look up a non-archived lead by normalized phone.
    pub fn find_lead_by_phone(&self, normalized_phone: &str) -> Result<Option<DbLead>, String> {
        self.query_one_lead(
            "SELECT id, name, email, phone, status, archived, created_at, updated_at
             FROM leads WHERE phone = ?1 AND archived = 0
             ORDER BY created_at LIMIT 1",
            params![normalized_phone],
        )
    }

    /// Look up a non-archived lead by email (case-insensitive).
    pub fn find_lead_by_email(&self, email: &str) -> Result<Option<DbLead>, String> {
        self.query_one_lead(
            "SELECT id, name, email, phone, status, archived, created_at, updated_at
             FROM leads WHERE email = LOWER(?1) AND archived = 0
             ORDER BY created_at LIMIT 1",
            params![email],
        )
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<DbLead>, String> {
        self.query_one_lead(
            "SELECT id, name, email, phone, status, archived, created_at, updated_at
             FROM leads WHERE id = ?1",
            params![id],
        )
    }

    fn query_one_lead(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<DbLead>, String> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| format!("Failed to prepare lead query: {e}"))?;
        let mut rows = stmt
            .query_map(params, map_lead_row)
            .map_err(|e| format!("Failed to query lead: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| format!("Failed to read lead row: {e}"))?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Property owners
    // =========================================================================

    pub fn upsert_owner(&self, owner: &DbOwner) -> Result<(), String> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO property_owners (id, name, email, phone, archived, created_at, updated_at)
                 VALUES (?1, ?2, LOWER(?3), ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = COALESCE(excluded.email, property_owners.email),
                    phone = COALESCE(excluded.phone, property_owners.phone),
                    archived = excluded.archived,
                    updated_at = excluded.updated_at",
                params![
                    owner.id,
                    owner.name,
                    owner.email,
                    owner.phone.as_deref().map(crate::resolver::normalize_phone),
                    owner.archived as i32,
                    owner.created_at,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert owner {}: {e}", owner.id))?;
        Ok(())
    }

    pub fn find_owner_by_phone(&self, normalized_phone: &str) -> Result<Option<DbOwner>, String> {
        self.query_one_owner(
            "SELECT id, name, email, phone, archived, created_at, updated_at
             FROM property_owners WHERE phone = ?1 AND archived = 0
             ORDER BY created_at LIMIT 1",
            params![normalized_phone],
        )
    }

    pub fn find_owner_by_email(&self, email: &str) -> Result<Option<DbOwner>, String> {
        self.query_one_owner(
            "SELECT id, name, email, phone, archived, created_at, updated_at
             FROM property_owners WHERE email = LOWER(?1) AND archived = 0
             ORDER BY created_at LIMIT 1",
            params![email],
        )
    }

    pub fn get_owner(&self, id: &str) -> Result<Option<DbOwner>, String> {
        self.query_one_owner(
            "SELECT id, name, email, phone, archived, created_at, updated_at
             FROM property_owners WHERE id = ?1",
            params![id],
        )
    }

    fn query_one_owner(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<DbOwner>, String> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| format!("Failed to prepare owner query: {e}"))?;
        let mut rows = stmt
            .query_map(params, map_owner_row)
            .map_err(|e| format!("Failed to query owner: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| format!("Failed to read owner row: {e}"))?)),
            None => Ok(None),
        }
    }
}

fn map_lead_row(row: &rusqlite::Row) -> rusqlite::Result<DbLead> {
    Ok(DbLead {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        status: row.get(4)?,
        archived: row.get::<_, i32>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_owner_row(row: &rusqlite::Row) -> rusqlite::Result<DbOwner> {
    Ok(DbOwner {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        archived: row.get::<_, i32>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
