//! Row types for the communications store.
//!
//! Timestamps are RFC 3339 strings throughout; SQLite stores them as
//! TEXT and lexicographic order matches chronological order.

use serde::{Deserialize, Serialize};

/// Channel a communication arrived on or was sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Sms,
    Email,
    Call,
    Voicemail,
}

impl CommunicationType {
    /// String label for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationType::Sms => "sms",
            CommunicationType::Email => "email",
            CommunicationType::Call => "call",
            CommunicationType::Voicemail => "voicemail",
        }
    }

    /// Parse from SQL string. Unknown labels fall back to Sms; rows are
    /// only ever written through `as_str`, so this path is defensive only
    /// for hand-edited databases.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "email" => CommunicationType::Email,
            "call" => CommunicationType::Call,
            "voicemail" => CommunicationType::Voicemail,
            _ => CommunicationType::Sms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "outbound" => Direction::Outbound,
            _ => Direction::Inbound,
        }
    }
}

/// A row from the `communications` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCommunication {
    pub id: String,
    pub lead_id: Option<String>,
    pub owner_id: Option<String>,
    pub communication_type: CommunicationType,
    pub direction: Direction,
    pub body: String,
    pub subject: Option<String>,
    pub from_contact: String,
    pub to_contact: String,
    /// Provider message id; unique per channel. Synthesized when the
    /// provider payload carries none.
    pub external_id: String,
    pub status: String,
    pub delivery_status: Option<String>,
    pub error_code: Option<String>,
    pub is_read: bool,
    pub recording_url: Option<String>,
    pub duration_secs: Option<i64>,
    /// Provider-specific bag, JSON-encoded.
    pub metadata: Option<String>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `leads` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLead {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `property_owners` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbOwner {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `user_phone_assignments` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPhoneAssignment {
    pub id: String,
    pub phone_number: String,
    pub user_id: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `notifications` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNotification {
    pub id: String,
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub communication_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// An append-only timeline entry (lead_timeline / work_order_timeline).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTimelineEntry {
    pub id: String,
    pub subject_id: String,
    pub entry_type: String,
    pub summary: String,
    pub created_at: String,
}

/// A row from the `snippets` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSnippet {
    pub id: String,
    pub user_id: String,
    pub shortcut: String,
    pub content: String,
    pub use_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `tone_profiles` table. Replaced wholesale on
/// re-analysis, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbToneProfile {
    pub user_id: String,
    pub formality: String,
    pub avg_sentence_length: f64,
    /// JSON array of observed greeting phrases.
    pub greetings: String,
    /// JSON array of observed closing phrases.
    pub closings: String,
    pub analyzed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_communication_type_roundtrip() {
        for ct in [
            CommunicationType::Sms,
            CommunicationType::Email,
            CommunicationType::Call,
            CommunicationType::Voicemail,
        ] {
            assert_eq!(CommunicationType::from_str_lossy(ct.as_str()), ct);
        }
    }

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!(Direction::from_str_lossy("inbound"), Direction::Inbound);
        assert_eq!(Direction::from_str_lossy("outbound"), Direction::Outbound);
        assert_eq!(Direction::from_str_lossy("garbage"), Direction::Inbound);
    }
}
