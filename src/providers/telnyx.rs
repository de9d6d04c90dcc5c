//! Telnyx v2: SMS sending and webhook payload types.
//!
//! Webhooks arrive as a JSON envelope: `{ "data": { "event_type": ...,
//! "payload": {...} } }`. The same envelope carries inbound messages
//! (`message.received`), delivery receipts (`message.finalized`), and
//! recording-ready notifications.

use serde::Deserialize;

use super::{error_for_response, send_with_retry, ProviderError, RetryPolicy};

const MESSAGES_URL: &str = "https://api.telnyx.com/v2/messages";

// ============================================================================
// Webhook payload types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TelnyxWebhook {
    #[serde(default)]
    pub data: Option<TelnyxEventData>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxEventData {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub payload: Option<TelnyxPayload>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<TelnyxParty>,
    #[serde(default)]
    pub to: Vec<TelnyxParty>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub recording_urls: Option<TelnyxRecordingUrls>,
    #[serde(default)]
    pub duration_millis: Option<i64>,
    #[serde(default)]
    pub occurred_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxParty {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxRecordingUrls {
    #[serde(default)]
    pub mp3: Option<String>,
}

impl TelnyxWebhook {
    pub fn event_type(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.event_type.as_str())
    }

    pub fn payload(&self) -> Option<&TelnyxPayload> {
        self.data.as_ref().and_then(|d| d.payload.as_ref())
    }
}

impl TelnyxPayload {
    pub fn from_number(&self) -> Option<&str> {
        self.from
            .as_ref()
            .map(|p| p.phone_number.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn to_number(&self) -> Option<&str> {
        self.to
            .first()
            .map(|p| p.phone_number.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Delivery state of the first recipient, for `message.finalized`.
    pub fn delivery_status(&self) -> Option<&str> {
        self.to.first().and_then(|p| p.status.as_deref())
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    data: SendMessageData,
}

#[derive(Debug, Deserialize)]
struct SendMessageData {
    id: String,
}

pub struct TelnyxClient {
    api_key: String,
    http: reqwest::Client,
}

impl TelnyxClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Send an SMS. Returns the provider message id.
    pub async fn send_sms(&self, to: &str, from: &str, text: &str) -> Result<String, ProviderError> {
        let response = send_with_retry(
            self.http
                .post(MESSAGES_URL)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "to": to,
                    "from": from,
                    "text": text,
                })),
            &RetryPolicy::default(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        Ok(body.data.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_received() {
        let json = r#"{
            "data": {
                "event_type": "message.received",
                "payload": {
                    "id": "3fa85f64-0000-4562-b3fc-2c963f66afa6",
                    "from": { "phone_number": "+14045551234" },
                    "to": [ { "phone_number": "+14045550100" } ],
                    "text": "Is the unit still available?",
                    "direction": "inbound",
                    "occurred_at": "2026-03-01T12:00:00Z"
                }
            }
        }"#;
        let webhook: TelnyxWebhook = serde_json::from_str(json).expect("parse");
        assert_eq!(webhook.event_type(), Some("message.received"));
        let payload = webhook.payload().expect("payload");
        assert_eq!(payload.from_number(), Some("+14045551234"));
        assert_eq!(payload.to_number(), Some("+14045550100"));
        assert_eq!(payload.text.as_deref(), Some("Is the unit still available?"));
    }

    #[test]
    fn test_parse_delivery_receipt() {
        let json = r#"{
            "data": {
                "event_type": "message.finalized",
                "payload": {
                    "id": "msg-77",
                    "to": [ { "phone_number": "+14045551234", "status": "delivered" } ]
                }
            }
        }"#;
        let webhook: TelnyxWebhook = serde_json::from_str(json).expect("parse");
        assert_eq!(webhook.event_type(), Some("message.finalized"));
        assert_eq!(
            webhook.payload().expect("payload").delivery_status(),
            Some("delivered")
        );
    }

    #[test]
    fn test_parse_recording_payload() {
        let json = r#"{
            "data": {
                "event_type": "call.recording.saved",
                "payload": {
                    "id": "rec-42",
                    "from": { "phone_number": "+14045551234" },
                    "to": [ { "phone_number": "+14045550100" } ],
                    "recording_urls": { "mp3": "https://recordings.telnyx.com/rec-42.mp3" },
                    "duration_millis": 32000
                }
            }
        }"#;
        let webhook: TelnyxWebhook = serde_json::from_str(json).expect("parse");
        let payload = webhook.payload().expect("payload");
        assert_eq!(
            payload.recording_urls.as_ref().and_then(|r| r.mp3.as_deref()),
            Some("https://recordings.telnyx.com/rec-42.mp3")
        );
        assert_eq!(payload.duration_millis, Some(32000));
    }

    #[test]
    fn test_parse_empty_envelope() {
        // Providers sometimes probe with empty bodies, must not panic
        let webhook: TelnyxWebhook = serde_json::from_str("{}").expect("parse");
        assert!(webhook.event_type().is_none());
        assert!(webhook.payload().is_none());
    }
}
