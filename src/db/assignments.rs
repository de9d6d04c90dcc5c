use chrono::Utc;
use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Phone assignments
    // =========================================================================

    /// Assign a provider phone number to a user. Any previous active
    /// assignment for the same number is deactivated first; the "at most
    /// one active assignment per number" invariant is enforced here, not
    /// by a schema constraint, matching how the routing layer depends on it.
    pub fn assign_phone(&self, phone_number: &str, user_id: &str) -> Result<DbPhoneAssignment, String> {
        let normalized = crate::resolver::normalize_phone(phone_number);
        let now = Utc::now().to_rfc3339();

        self.with_transaction(|db| {
            db.conn
                .execute(
                    "UPDATE user_phone_assignments
                     SET is_active = 0, updated_at = ?1
                     WHERE phone_number = ?2 AND is_active = 1",
                    params![now, normalized],
                )
                .map_err(|e| format!("Failed to deactivate prior assignment: {e}"))?;

            let assignment = DbPhoneAssignment {
                id: uuid::Uuid::new_v4().to_string(),
                phone_number: normalized.clone(),
                user_id: user_id.to_string(),
                is_active: true,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            db.conn
                .execute(
                    "INSERT INTO user_phone_assignments
                        (id, phone_number, user_id, is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                    params![
                        assignment.id,
                        assignment.phone_number,
                        assignment.user_id,
                        assignment.created_at,
                        assignment.updated_at,
                    ],
                )
                .map_err(|e| format!("Failed to insert assignment: {e}"))?;
            Ok(assignment)
        })
    }

    /// Active assignment for a normalized phone number, if any.
    pub fn find_active_assignment(
        &self,
        normalized_phone: &str,
    ) -> Result<Option<DbPhoneAssignment>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, phone_number, user_id, is_active, created_at, updated_at
                 FROM user_phone_assignments
                 WHERE phone_number = ?1 AND is_active = 1
                 LIMIT 1",
            )
            .map_err(|e| format!("Failed to prepare assignment query: {e}"))?;
        let mut rows = stmt
            .query_map(params![normalized_phone], map_assignment_row)
            .map_err(|e| format!("Failed to query assignment: {e}"))?;
        match rows.next() {
            Some(row) => Ok(Some(
                row.map_err(|e| format!("Failed to read assignment row: {e}"))?,
            )),
            None => Ok(None),
        }
    }

    /// Soft-revoke an assignment. Returns false when the id is unknown.
    pub fn deactivate_assignment(&self, id: &str) -> Result<bool, String> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE user_phone_assignments SET is_active = 0, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| format!("Failed to deactivate assignment: {e}"))?;
        Ok(rows > 0)
    }
}

fn map_assignment_row(row: &rusqlite::Row) -> rusqlite::Result<DbPhoneAssignment> {
    Ok(DbPhoneAssignment {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        user_id: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;

    #[test]
    fn test_assign_and_lookup() {
        let db = test_db();
        db.assign_phone("+1 (404) 555-0100", "user-7").expect("assign");

        let found = db
            .find_active_assignment("4045550100")
            .expect("query")
            .expect("assignment exists");
        assert_eq!(found.user_id, "user-7");
    }

    #[test]
    fn test_reassignment_deactivates_previous() {
        let db = test_db();
        let first = db.assign_phone("4045550100", "user-a").expect("assign a");
        db.assign_phone("4045550100", "user-b").expect("assign b");

        let active = db
            .find_active_assignment("4045550100")
            .expect("query")
            .expect("one active assignment");
        assert_eq!(active.user_id, "user-b");

        // Exactly one active row for the number
        let count: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM user_phone_assignments
                 WHERE phone_number = '4045550100' AND is_active = 1",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);

        // The old assignment survives as an inactive row
        let old_active = db
            .conn_ref()
            .query_row(
                "SELECT is_active FROM user_phone_assignments WHERE id = ?1",
                [&first.id],
                |row| row.get::<_, i32>(0),
            )
            .expect("old row");
        assert_eq!(old_active, 0);
    }

    #[test]
    fn test_deactivate() {
        let db = test_db();
        let assignment = db.assign_phone("4045550101", "user-c").expect("assign");
        assert!(db.deactivate_assignment(&assignment.id).expect("deactivate"));
        assert!(db
            .find_active_assignment("4045550101")
            .expect("query")
            .is_none());
        assert!(!db.deactivate_assignment("ghost").expect("unknown id"));
    }
}
