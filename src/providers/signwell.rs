//! SignWell document lifecycle webhook payload types.
//!
//! SignWell posts `{ "event": { "type": ... }, "data": { "object": {...} } }`
//! for viewed/signed/completed/declined/expired transitions.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignWellWebhook {
    #[serde(default)]
    pub event: Option<SignWellEventInfo>,
    #[serde(default)]
    pub data: Option<SignWellData>,
}

#[derive(Debug, Deserialize)]
pub struct SignWellEventInfo {
    #[serde(default, rename = "type")]
    pub event_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SignWellData {
    #[serde(default)]
    pub object: Option<SignWellDocument>,
}

#[derive(Debug, Deserialize)]
pub struct SignWellDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub recipients: Vec<SignWellRecipient>,
    /// Application-supplied correlation id, carried back on every event.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SignWellRecipient {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SignWellWebhook {
    pub fn event_type(&self) -> Option<&str> {
        self.event.as_ref().map(|e| e.event_type.as_str())
    }

    pub fn document(&self) -> Option<&SignWellDocument> {
        self.data.as_ref().and_then(|d| d.object.as_ref())
    }
}

/// Timeline-friendly label for a document event, or None for event types
/// this hub does not track.
pub fn document_event_label(event_type: &str) -> Option<&'static str> {
    match event_type {
        "document_viewed" => Some("viewed"),
        "document_signed" => Some("signed"),
        "document_completed" => Some("completed"),
        "document_declined" => Some("declined"),
        "document_expired" => Some("expired"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signed_event() {
        let json = r#"{
            "event": { "type": "document_signed" },
            "data": {
                "object": {
                    "id": "doc-91",
                    "name": "Lease Agreement - 12 Maple St",
                    "recipients": [ { "email": "jordan@example.com", "name": "Jordan Reyes" } ],
                    "metadata": { "lead_id": "lead-1" }
                }
            }
        }"#;
        let webhook: SignWellWebhook = serde_json::from_str(json).expect("parse");
        assert_eq!(webhook.event_type(), Some("document_signed"));
        let doc = webhook.document().expect("document");
        assert_eq!(doc.id, "doc-91");
        assert_eq!(doc.recipients[0].email.as_deref(), Some("jordan@example.com"));
        assert_eq!(
            doc.metadata.as_ref().and_then(|m| m.get("lead_id")).and_then(|v| v.as_str()),
            Some("lead-1")
        );
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(document_event_label("document_signed"), Some("signed"));
        assert_eq!(document_event_label("document_expired"), Some("expired"));
        assert_eq!(document_event_label("document_sent"), None);
    }

    #[test]
    fn test_parse_empty_payload() {
        let webhook: SignWellWebhook = serde_json::from_str("{}").expect("parse");
        assert!(webhook.event_type().is_none());
        assert!(webhook.document().is_none());
    }
}
