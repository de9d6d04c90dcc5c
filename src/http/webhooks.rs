//! Provider webhook handlers.
//!
//! The contract with every calling provider: a non-2xx response means
//! "redeliver". So these handlers validate just enough to act, swallow
//! internal failures after logging them, and always acknowledge:
//! JSON for Telnyx/SignWell, TwiML for Twilio.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Form;

use crate::db::{CommunicationType, Direction};
use crate::ingest::{self, NormalizedMessage};
use crate::providers::signwell::{document_event_label, SignWellWebhook};
use crate::providers::telnyx::TelnyxWebhook;
use crate::providers::twilio::{twiml_empty_response, TwilioCallStatus};
use crate::resolver::{self, ResolvedIdentity};
use crate::state::AppState;

/// 200 with an empty body, the "go away quietly" acknowledgement for
/// payloads missing critical fields.
fn empty_ack() -> Response {
    (StatusCode::OK, "").into_response()
}

fn success_ack() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

fn twiml_ack() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_empty_response(),
    )
        .into_response()
}

// ============================================================================
// Telnyx SMS
// ============================================================================

pub async fn telnyx_sms(State(state): State<Arc<AppState>>, body: String) -> Response {
    let webhook: TelnyxWebhook = match serde_json::from_str(&body) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("Telnyx webhook: unparseable body: {}", e);
            return empty_ack();
        }
    };

    match webhook.event_type() {
        Some("message.received") => {
            let Some(payload) = webhook.payload() else {
                return empty_ack();
            };
            let (Some(from), Some(to)) = (payload.from_number(), payload.to_number()) else {
                log::warn!("Telnyx webhook: message.received missing from/to");
                return empty_ack();
            };

            let mut msg = NormalizedMessage::inbound_sms(
                from,
                to,
                payload.text.as_deref().unwrap_or(""),
                payload.id.clone(),
            );
            msg.occurred_at = payload.occurred_at.clone();

            if let Err(e) = ingest::record_inbound(&state, msg) {
                log::error!("Telnyx webhook: failed to record inbound SMS: {}", e);
            }
            success_ack()
        }
        Some("message.sent") | Some("message.finalized") => {
            let Some(payload) = webhook.payload() else {
                return empty_ack();
            };
            let Some(external_id) = payload.id.as_deref() else {
                return empty_ack();
            };
            let delivery = payload.delivery_status().unwrap_or("sent");
            let status = match delivery {
                "delivered" => "delivered",
                "sending_failed" | "delivery_failed" => "failed",
                _ => "sent",
            };
            let result = state.db.lock().update_delivery_status(
                CommunicationType::Sms,
                external_id,
                status,
                Some(delivery),
                None,
            );
            match result {
                Ok(true) => state.debouncer.notify(),
                Ok(false) => {
                    log::debug!("Telnyx webhook: delivery receipt for unknown message {}", external_id)
                }
                Err(e) => log::error!("Telnyx webhook: delivery update failed: {}", e),
            }
            success_ack()
        }
        _ => empty_ack(),
    }
}

// ============================================================================
// Telnyx voicemail (recording ready)
// ============================================================================

pub async fn telnyx_voicemail(State(state): State<Arc<AppState>>, body: String) -> Response {
    let webhook: TelnyxWebhook = match serde_json::from_str(&body) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("Telnyx voicemail webhook: unparseable body: {}", e);
            return empty_ack();
        }
    };

    let Some(payload) = webhook.payload() else {
        return empty_ack();
    };
    let (Some(from), Some(to)) = (payload.from_number(), payload.to_number()) else {
        log::warn!("Telnyx voicemail webhook: missing from/to");
        return empty_ack();
    };

    let recording_url = payload
        .recording_urls
        .as_ref()
        .and_then(|r| r.mp3.as_deref())
        .filter(|raw| match url::Url::parse(raw) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Telnyx voicemail webhook: bad recording url '{}': {}", raw, e);
                false
            }
        })
        .map(|s| s.to_string());

    let msg = NormalizedMessage {
        communication_type: CommunicationType::Voicemail,
        direction: Direction::Inbound,
        from_contact: from.to_string(),
        to_contact: to.to_string(),
        body: String::new(),
        subject: None,
        external_id: payload.id.clone(),
        status: "voicemail".to_string(),
        recording_url,
        duration_secs: payload.duration_millis.map(|ms| ms / 1000),
        metadata: None,
        occurred_at: payload.occurred_at.clone(),
    };

    if let Err(e) = ingest::record_inbound(&state, msg) {
        log::error!("Telnyx voicemail webhook: failed to record voicemail: {}", e);
    }
    success_ack()
}

// ============================================================================
// Twilio call status
// ============================================================================

pub async fn twilio_call_status(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<TwilioCallStatus>,
) -> Response {
    let Some(call_sid) = payload.call_sid.clone().filter(|s| !s.is_empty()) else {
        log::warn!("Twilio webhook: call-status without CallSid");
        return twiml_ack();
    };

    let metadata = payload
        .error_code
        .as_ref()
        .map(|code| serde_json::json!({ "error_code": code }));

    let msg = NormalizedMessage {
        communication_type: CommunicationType::Call,
        direction: if payload.is_inbound() {
            Direction::Inbound
        } else {
            Direction::Outbound
        },
        from_contact: payload.from.clone().unwrap_or_default(),
        to_contact: payload.to.clone().unwrap_or_default(),
        body: String::new(),
        subject: None,
        external_id: Some(call_sid),
        status: payload.normalized_status().to_string(),
        recording_url: payload.recording_url.clone(),
        duration_secs: payload.duration_secs(),
        metadata,
        occurred_at: None,
    };

    if let Err(e) = ingest::record_inbound(&state, msg) {
        log::error!("Twilio webhook: failed to record call status: {}", e);
    }
    twiml_ack()
}

// ============================================================================
// SignWell document lifecycle
// ============================================================================

pub async fn signwell(State(state): State<Arc<AppState>>, body: String) -> Response {
    let webhook: SignWellWebhook = match serde_json::from_str(&body) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("SignWell webhook: unparseable body: {}", e);
            return success_ack();
        }
    };

    let Some(event_type) = webhook.event_type() else {
        return success_ack();
    };
    let Some(label) = document_event_label(event_type) else {
        return success_ack();
    };
    let Some(document) = webhook.document() else {
        log::warn!("SignWell webhook: {} without document object", event_type);
        return success_ack();
    };

    // Correlate back to a lead: explicit metadata id first, recipient
    // email as fallback.
    let lead_id = document
        .metadata
        .as_ref()
        .and_then(|m| m.get("lead_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            let db = state.db.lock();
            document.recipients.iter().find_map(|r| {
                let email = r.email.as_deref()?;
                match resolver::resolve_email(&db, email) {
                    Ok(ResolvedIdentity::Lead { id }) => Some(id),
                    _ => None,
                }
            })
        });

    if let Some(lead_id) = lead_id {
        let name = document.name.as_deref().unwrap_or("document");
        let summary = format!("Document {}: {}", label, name);
        if let Err(e) = state
            .db
            .lock()
            .append_lead_timeline(&lead_id, &format!("document_{}", label), &summary)
        {
            log::error!("SignWell webhook: timeline write failed: {}", e);
        }
        state.debouncer.notify();
    } else {
        log::warn!(
            "SignWell webhook: {} for document {} matched no lead",
            event_type,
            document.id
        );
    }

    success_ack()
}

// ============================================================================
// CRM phone-number sync
// ============================================================================

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmPhoneNumberSync {
    #[serde(default)]
    phone_numbers: Vec<CrmPhoneNumber>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmPhoneNumber {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    user_id: String,
}

/// The CRM pushes its number-to-user routing table whenever an admin
/// reassigns a line. Entries missing either field are skipped.
pub async fn crm_phone_numbers(State(state): State<Arc<AppState>>, body: String) -> Response {
    let payload: CrmPhoneNumberSync = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("CRM phone sync webhook: unparseable body: {}", e);
            return empty_ack();
        }
    };

    let mut synced = 0u32;
    {
        let db = state.db.lock();
        for entry in &payload.phone_numbers {
            if entry.phone_number.trim().is_empty() || entry.user_id.trim().is_empty() {
                continue;
            }
            match db.assign_phone(&entry.phone_number, &entry.user_id) {
                Ok(_) => synced += 1,
                Err(e) => log::error!(
                    "CRM phone sync webhook: failed to assign {}: {}",
                    entry.phone_number,
                    e
                ),
            }
        }
    }
    log::info!("CRM phone sync webhook: synced {} assignments", synced);
    success_ack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contacts::tests::sample_lead;
    use crate::state::test_utils::test_state;
    use axum::body::to_bytes;

    async fn body_string(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    fn telnyx_sms_body(from: &str, to: &str, text: &str, id: &str) -> String {
        serde_json::json!({
            "data": {
                "event_type": "message.received",
                "payload": {
                    "id": id,
                    "from": { "phone_number": from },
                    "to": [ { "phone_number": to } ],
                    "text": text
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_telnyx_sms_stores_and_acks() {
        let state = test_state();
        state
            .db
            .lock()
            .assign_phone("4045550100", "agent-1")
            .expect("assign");

        let response = telnyx_sms(
            State(state.clone()),
            telnyx_sms_body("+14045551234", "+14045550100", "hello", "msg-1"),
        )
        .await;
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("success"));

        assert_eq!(state.db.lock().count_communications().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_telnyx_sms_retry_is_idempotent() {
        let state = test_state();
        state
            .db
            .lock()
            .assign_phone("4045550100", "agent-1")
            .expect("assign");

        let body = telnyx_sms_body("4045551234", "4045550100", "hello", "msg-dup");
        telnyx_sms(State(state.clone()), body.clone()).await;
        telnyx_sms(State(state.clone()), body).await;

        assert_eq!(
            state.db.lock().count_communications().expect("count"),
            1,
            "webhook redelivery must not duplicate"
        );
    }

    #[tokio::test]
    async fn test_telnyx_sms_missing_fields_gets_empty_200() {
        let state = test_state();
        let body = serde_json::json!({
            "data": { "event_type": "message.received", "payload": { "text": "hi" } }
        })
        .to_string();

        let response = telnyx_sms(State(state.clone()), body).await;
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK, "never invite a retry storm");
        assert!(body.is_empty());
        assert_eq!(state.db.lock().count_communications().expect("count"), 0);
    }

    #[tokio::test]
    async fn test_telnyx_garbage_body_still_200() {
        let state = test_state();
        let response = telnyx_sms(State(state), "not json at all".to_string()).await;
        let (status, _) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_telnyx_delivery_receipt_updates_status() {
        let state = test_state();
        // Seed an outbound send
        let msg = NormalizedMessage {
            communication_type: CommunicationType::Sms,
            direction: Direction::Outbound,
            from_contact: "4045550100".to_string(),
            to_contact: "4045551234".to_string(),
            body: "on our way".to_string(),
            subject: None,
            external_id: Some("msg-out".to_string()),
            status: "sent".to_string(),
            recording_url: None,
            duration_secs: None,
            metadata: None,
            occurred_at: None,
        };
        ingest::record_outbound(&state, msg).expect("seed");

        let body = serde_json::json!({
            "data": {
                "event_type": "message.finalized",
                "payload": {
                    "id": "msg-out",
                    "to": [ { "phone_number": "+14045551234", "status": "delivered" } ]
                }
            }
        })
        .to_string();
        telnyx_sms(State(state.clone()), body).await;

        let stored = state
            .db
            .lock()
            .get_communication_by_external_id(CommunicationType::Sms, "msg-out")
            .expect("query")
            .expect("row");
        assert_eq!(stored.status, "delivered");
    }

    #[tokio::test]
    async fn test_voicemail_unmatched_number_silent_drop() {
        let state = test_state();

        let body = serde_json::json!({
            "data": {
                "event_type": "call.recording.saved",
                "payload": {
                    "id": "rec-9",
                    "from": { "phone_number": "+14045551234" },
                    "to": [ { "phone_number": "+14049999999" } ],
                    "recording_urls": { "mp3": "https://recordings.telnyx.com/rec-9.mp3" },
                    "duration_millis": 15000
                }
            }
        })
        .to_string();

        let response = telnyx_voicemail(State(state.clone()), body).await;
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&body).expect("json")["success"],
            serde_json::Value::Bool(true)
        );

        // Zero rows anywhere: the silent drop is preserved behavior
        let db = state.db.lock();
        assert_eq!(db.count_communications().expect("count"), 0);
        let notif: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))
            .expect("count");
        assert_eq!(notif, 0);
        let timeline: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM lead_timeline", [], |r| r.get(0))
            .expect("count");
        assert_eq!(timeline, 0);
    }

    #[tokio::test]
    async fn test_voicemail_with_assignment_stores_recording() {
        let state = test_state();
        state
            .db
            .lock()
            .assign_phone("4045550100", "agent-1")
            .expect("assign");

        let body = serde_json::json!({
            "data": {
                "event_type": "call.recording.saved",
                "payload": {
                    "id": "rec-10",
                    "from": { "phone_number": "+14045551234" },
                    "to": [ { "phone_number": "+14045550100" } ],
                    "recording_urls": { "mp3": "https://recordings.telnyx.com/rec-10.mp3" },
                    "duration_millis": 62000
                }
            }
        })
        .to_string();
        telnyx_voicemail(State(state.clone()), body).await;

        let stored = state
            .db
            .lock()
            .get_communication_by_external_id(CommunicationType::Voicemail, "rec-10")
            .expect("query")
            .expect("row");
        assert_eq!(stored.status, "voicemail");
        assert_eq!(stored.duration_secs, Some(62));
        assert!(stored.recording_url.expect("url").ends_with("rec-10.mp3"));
    }

    #[tokio::test]
    async fn test_twilio_call_status_responds_twiml() {
        let state = test_state();
        let payload = TwilioCallStatus {
            call_sid: Some("CA-77".to_string()),
            call_status: Some("completed".to_string()),
            from: Some("+14045551234".to_string()),
            to: Some("+14045550100".to_string()),
            call_duration: Some("45".to_string()),
            ..Default::default()
        };

        let response = twilio_call_status(State(state.clone()), Form(payload)).await;
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<Response></Response>"));

        let stored = state
            .db
            .lock()
            .get_communication_by_external_id(CommunicationType::Call, "CA-77")
            .expect("query")
            .expect("row");
        assert_eq!(stored.status, "answered");
        assert_eq!(stored.duration_secs, Some(45));
    }

    #[tokio::test]
    async fn test_twilio_missing_call_sid_still_twiml_200() {
        let state = test_state();
        let response =
            twilio_call_status(State(state.clone()), Form(TwilioCallStatus::default())).await;
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<Response></Response>"));
        assert_eq!(state.db.lock().count_communications().expect("count"), 0);
    }

    #[tokio::test]
    async fn test_signwell_signed_event_writes_lead_timeline() {
        let state = test_state();
        state
            .db
            .lock()
            .upsert_lead(&sample_lead("lead-1", "4045551234"))
            .expect("lead");

        let body = serde_json::json!({
            "event": { "type": "document_signed" },
            "data": {
                "object": {
                    "id": "doc-1",
                    "name": "Lease - 12 Maple St",
                    "metadata": { "lead_id": "lead-1" }
                }
            }
        })
        .to_string();
        let response = signwell(State(state.clone()), body).await;
        let (status, _) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);

        let entries = state
            .db
            .lock()
            .get_lead_timeline("lead-1", 10)
            .expect("timeline");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].summary.contains("signed"));
    }

    #[tokio::test]
    async fn test_signwell_recipient_email_fallback() {
        let state = test_state();
        let mut lead = sample_lead("lead-2", "4045550002");
        lead.email = Some("jordan@example.com".to_string());
        state.db.lock().upsert_lead(&lead).expect("lead");

        let body = serde_json::json!({
            "event": { "type": "document_completed" },
            "data": {
                "object": {
                    "id": "doc-2",
                    "name": "Lease",
                    "recipients": [ { "email": "jordan@example.com" } ]
                }
            }
        })
        .to_string();
        signwell(State(state.clone()), body).await;

        let entries = state
            .db
            .lock()
            .get_lead_timeline("lead-2", 10)
            .expect("timeline");
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_crm_phone_number_sync() {
        let state = test_state();
        let body = serde_json::json!({
            "phoneNumbers": [
                { "phoneNumber": "+14045550100", "userId": "agent-1" },
                { "phoneNumber": "+14045550101", "userId": "agent-2" },
                { "phoneNumber": "", "userId": "agent-3" }
            ]
        })
        .to_string();
        let response = crm_phone_numbers(State(state.clone()), body).await;
        let (status, _) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);

        let db = state.db.lock();
        assert_eq!(
            db.find_active_assignment("4045550100")
                .expect("query")
                .expect("assignment")
                .user_id,
            "agent-1"
        );
        assert!(db.find_active_assignment("4045550101").expect("query").is_some());
    }

    #[tokio::test]
    async fn test_signwell_unknown_event_ignored() {
        let state = test_state();
        let body = serde_json::json!({
            "event": { "type": "document_sent" },
            "data": { "object": { "id": "doc-3" } }
        })
        .to_string();
        let response = signwell(State(state.clone()), body).await;
        let (status, _) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
    }
}
