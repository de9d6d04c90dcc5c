//! CRM sync source: conversation and call-transcript pulls.
//!
//! The CRM keeps its own copy of message history; this client pulls
//! anything newer than the last sync and reduces it to normalized
//! messages for the ingest pipeline. Outbound entries in the CRM feed
//! are skipped; the hub already recorded its own sends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{error_for_response, send_with_retry, ProviderError, RetryPolicy};
use crate::db::{CommunicationType, Direction};
use crate::ingest::NormalizedMessage;
use crate::sync::SyncSource;

const API_BASE: &str = "https://services.leadconnectorhq.com";

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationsResponse {
    #[serde(default)]
    conversations: Vec<CrmConversation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmConversation {
    id: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    assigned_number: Option<String>,
    #[serde(default)]
    last_message_body: Option<String>,
    #[serde(default)]
    last_message_direction: Option<String>,
    #[serde(default)]
    date_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsResponse {
    #[serde(default)]
    calls: Vec<CrmCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmCall {
    id: String,
    #[serde(default)]
    from_number: Option<String>,
    #[serde(default)]
    to_number: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    recording_url: Option<String>,
    #[serde(default)]
    date_created: Option<String>,
}

fn conversation_to_message(conv: CrmConversation) -> Option<NormalizedMessage> {
    // Only inbound entries feed the inbox; our own sends were recorded at
    // send time.
    if conv.last_message_direction.as_deref() != Some("inbound") {
        return None;
    }
    Some(NormalizedMessage {
        communication_type: CommunicationType::Sms,
        direction: Direction::Inbound,
        from_contact: conv.phone.unwrap_or_default(),
        to_contact: conv.assigned_number.unwrap_or_default(),
        body: conv.last_message_body.unwrap_or_default(),
        subject: None,
        external_id: Some(format!("crm-conv-{}", conv.id)),
        status: "received".to_string(),
        recording_url: None,
        duration_secs: None,
        metadata: None,
        occurred_at: conv.date_updated,
    })
}

fn call_to_message(call: CrmCall) -> NormalizedMessage {
    NormalizedMessage {
        communication_type: CommunicationType::Call,
        direction: Direction::Inbound,
        from_contact: call.from_number.unwrap_or_default(),
        to_contact: call.to_number.unwrap_or_default(),
        body: call.transcript.unwrap_or_default(),
        subject: None,
        external_id: Some(format!("crm-call-{}", call.id)),
        status: "answered".to_string(),
        recording_url: call.recording_url,
        duration_secs: call.duration,
        metadata: None,
        occurred_at: call.date_created,
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct CrmClient {
    api_key: String,
    location_id: String,
    http: reqwest::Client,
}

impl CrmClient {
    pub fn new(api_key: &str, location_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            location_id: location_id.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<T, ProviderError> {
        let mut request = self
            .http
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(&self.api_key)
            .query(&[("locationId", self.location_id.as_str())]);
        if let Some(since) = since {
            request = request.query(&[("startAfterDate", since.to_rfc3339())]);
        }

        let response = send_with_retry(request, &RetryPolicy::default()).await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl SyncSource for CrmClient {
    async fn fetch_conversations(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedMessage>, ProviderError> {
        let response: ConversationsResponse =
            self.get_json("/conversations/search", since).await?;
        Ok(response
            .conversations
            .into_iter()
            .filter_map(conversation_to_message)
            .collect())
    }

    async fn fetch_call_transcripts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedMessage>, ProviderError> {
        let response: CallsResponse = self.get_json("/calls", since).await?;
        Ok(response.calls.into_iter().map(call_to_message).collect())
    }
}
