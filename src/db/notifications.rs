use chrono::Utc;
use rusqlite::params;

use super::*;

/// Fetch window for the notification list. Older rows stay in the table
/// but fall out of view; there is no pruning job.
const NOTIFICATION_WINDOW: usize = 20;

impl CommsDb {
    // =========================================================================
    // Notifications
    // =========================================================================

    pub fn insert_notification(&self, notification: &DbNotification) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO notifications
                    (id, user_id, notification_type, title, message, communication_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    notification.id,
                    notification.user_id,
                    notification.notification_type,
                    notification.title,
                    notification.message,
                    notification.communication_id,
                    notification.is_read as i32,
                    notification.created_at,
                ],
            )
            .map_err(|e| format!("Failed to insert notification: {e}"))?;
        Ok(())
    }

    /// Newest notifications for a user, capped at the fetch window.
    pub fn get_notifications(&self, user_id: &str) -> Result<Vec<DbNotification>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, notification_type, title, message,
                        communication_id, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| format!("Failed to prepare notifications query: {e}"))?;
        let rows = stmt
            .query_map(params![user_id, NOTIFICATION_WINDOW as i64], map_notification_row)
            .map_err(|e| format!("Failed to query notifications: {e}"))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| format!("Failed to read notification row: {e}"))?);
        }
        Ok(results)
    }

    pub fn mark_notification_read(&self, id: &str) -> Result<bool, String> {
        let rows = self
            .conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| format!("Failed to mark notification read: {e}"))?;
        Ok(rows > 0)
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> Result<i64, String> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| format!("Failed to count unread notifications: {e}"))
    }
}

fn map_notification_row(row: &rusqlite::Row) -> rusqlite::Result<DbNotification> {
    Ok(DbNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        notification_type: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        communication_id: row.get(5)?,
        is_read: row.get::<_, i32>(6)? != 0,
        created_at: row.get(7)?,
    })
}

/// Build a notification row for an inbound communication.
pub fn notification_for_inbound(user_id: &str, comm: &DbCommunication) -> DbNotification {
    let (title, message) = match comm.communication_type {
        CommunicationType::Sms => (
            "New text message".to_string(),
            preview(&comm.body),
        ),
        CommunicationType::Email => (
            comm.subject.clone().unwrap_or_else(|| "New email".to_string()),
            preview(&comm.body),
        ),
        CommunicationType::Call => (
            "Missed call".to_string(),
            format!("Call from {}", comm.from_contact),
        ),
        CommunicationType::Voicemail => (
            "New voicemail".to_string(),
            format!("Voicemail from {}", comm.from_contact),
        ),
    };
    DbNotification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        notification_type: format!("inbound_{}", comm.communication_type.as_str()),
        title,
        message,
        communication_id: Some(comm.id.clone()),
        is_read: false,
        created_at: Utc::now().to_rfc3339(),
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > 100 {
        let truncated: String = body.chars().take(100).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}
