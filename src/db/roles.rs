use rusqlite::params;

use super::*;

impl CommsDb {
    // =========================================================================
    // Roles
    // =========================================================================

    pub fn get_user_roles(&self, user_id: &str) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT role FROM user_roles WHERE user_id = ?1")
            .map_err(|e| format!("Failed to prepare roles query: {e}"))?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| format!("Failed to query roles: {e}"))?;
        let mut roles = Vec::new();
        for row in rows {
            roles.push(row.map_err(|e| format!("Failed to read role row: {e}"))?);
        }
        Ok(roles)
    }

    pub fn grant_role(&self, user_id: &str, role: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                params![user_id, role],
            )
            .map_err(|e| format!("Failed to grant role: {e}"))?;
        Ok(())
    }
}
