//! Outbound sends and inbox queries.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::auth;
use crate::db::{CommunicationType, DbCommunication, Direction};
use crate::error::ApiError;
use crate::fanout::CommsEvent;
use crate::ingest::{self, NormalizedMessage};
use crate::providers::resend::ResendClient;
use crate::providers::telnyx::TelnyxClient;
use crate::search::{self, SearchItem};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const SEARCH_SCAN_LIMIT: usize = 500;

// ============================================================================
// Send SMS
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsResponse {
    pub id: String,
    pub communication_id: String,
}

pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SendSmsRequest>,
) -> ApiResult<Json<SendSmsResponse>> {
    auth::authenticate(&state, &headers).await?;

    if req.to.trim().is_empty() {
        return Err(ApiError::Validation("to is required".to_string()));
    }
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message is required".to_string()));
    }

    let (api_key, default_from) = {
        let config = state.config.read();
        (config.telnyx.api_key.clone(), config.telnyx.default_from.clone())
    };
    let api_key = api_key.ok_or_else(|| ApiError::Validation("Telnyx is not configured".to_string()))?;
    let from = req
        .from
        .or(default_from)
        .ok_or_else(|| ApiError::Validation("no sending number configured".to_string()))?;

    let provider_id = TelnyxClient::new(&api_key)
        .send_sms(&req.to, &from, &req.message)
        .await?;

    let msg = NormalizedMessage {
        communication_type: CommunicationType::Sms,
        direction: Direction::Outbound,
        from_contact: from,
        to_contact: req.to,
        body: req.message,
        subject: None,
        external_id: Some(provider_id.clone()),
        status: "sent".to_string(),
        recording_url: None,
        duration_secs: None,
        metadata: None,
        occurred_at: None,
    };
    let communication_id = ingest::record_outbound(&state, msg)?;

    Ok(Json(SendSmsResponse {
        id: provider_id,
        communication_id,
    }))
}

// ============================================================================
// Send email
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_id: Option<String>,
}

pub async fn send_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SendEmailRequest>,
) -> ApiResult<Json<SendEmailResponse>> {
    auth::authenticate(&state, &headers).await?;

    if req.to.trim().is_empty() {
        return Err(ApiError::Validation("to is required".to_string()));
    }
    if req.subject.trim().is_empty() {
        return Err(ApiError::Validation("subject is required".to_string()));
    }

    let (api_key, from_address) = {
        let config = state.config.read();
        (config.resend.api_key.clone(), config.resend.from_address.clone())
    };
    let api_key = api_key.ok_or_else(|| ApiError::Validation("Resend is not configured".to_string()))?;
    let from = from_address
        .ok_or_else(|| ApiError::Validation("no sending address configured".to_string()))?;

    let provider_id = ResendClient::new(&api_key)
        .send_email(&from, &req.to, &req.subject, &req.body)
        .await?;

    // Leads get a communication row + timeline entry; other contact types
    // are send-only.
    let communication_id = if req.contact_type.as_deref() == Some("lead") {
        let msg = NormalizedMessage {
            communication_type: CommunicationType::Email,
            direction: Direction::Outbound,
            from_contact: from,
            to_contact: req.to,
            body: req.body,
            subject: Some(req.subject),
            external_id: Some(provider_id.clone()),
            status: "sent".to_string(),
            recording_url: None,
            duration_secs: None,
            metadata: None,
            occurred_at: None,
        };
        Some(ingest::record_outbound(&state, msg)?)
    } else {
        None
    };

    Ok(Json(SendEmailResponse {
        id: provider_id,
        communication_id,
    }))
}

// ============================================================================
// Inbox listing and search
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_communications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<DbCommunication>>> {
    auth::authenticate(&state, &headers).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let db = state.db.lock();
    let rows = if let Some(lead_id) = query.lead_id {
        db.get_communications_for_lead(&lead_id, limit)?
    } else if let Some(owner_id) = query.owner_id {
        db.get_communications_for_owner(&owner_id, limit)?
    } else {
        db.get_recent_communications(limit)?
    };
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub score: u32,
    pub communication: DbCommunication,
}

pub async fn search_communications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    auth::authenticate(&state, &headers).await?;

    let terms = search::tokenize_query(&query.q);
    if terms.is_empty() {
        return Err(ApiError::Validation("q is required".to_string()));
    }

    let db = state.db.lock();
    let rows = db.get_recent_communications(SEARCH_SCAN_LIMIT)?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter_map(|comm| {
            let name = contact_name(&db, &comm).unwrap_or_default();
            let item = SearchItem {
                name,
                email: if comm.communication_type == CommunicationType::Email {
                    match comm.direction {
                        Direction::Inbound => comm.from_contact.clone(),
                        Direction::Outbound => comm.to_contact.clone(),
                    }
                } else {
                    String::new()
                },
                phone: if comm.communication_type == CommunicationType::Email {
                    String::new()
                } else {
                    match comm.direction {
                        Direction::Inbound => comm.from_contact.clone(),
                        Direction::Outbound => comm.to_contact.clone(),
                    }
                },
                subject: comm.subject.clone().unwrap_or_default(),
                body: comm.body.clone(),
            };
            let score = search::search_score(&item, &terms);
            (score > 0).then_some(SearchHit {
                score,
                communication: comm,
            })
        })
        .collect();
    drop(db);

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(Json(hits))
}

// ============================================================================
// Merged thread listing
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    #[serde(flatten)]
    pub thread: search::ThreadSummary,
    /// Prefill subject for a reply composer, for email threads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_subject: Option<String>,
}

pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ThreadView>>> {
    auth::authenticate(&state, &headers).await?;

    let db = state.db.lock();
    let rows = db.get_recent_communications(SEARCH_SCAN_LIMIT)?;

    let mut subjects = std::collections::HashMap::new();
    let summaries: Vec<search::ThreadSummary> = rows
        .iter()
        .map(|comm| {
            if let Some(subject) = &comm.subject {
                subjects.insert(comm.id.clone(), subject.clone());
            }
            let counterparty = match comm.direction {
                Direction::Inbound => &comm.from_contact,
                Direction::Outbound => &comm.to_contact,
            };
            let name = contact_name(&db, comm)
                .unwrap_or_else(|| search::format_phone_for_display(counterparty));
            search::ThreadSummary {
                contact_name: name,
                contact_key: counterparty.clone(),
                last_message_id: comm.id.clone(),
                last_message_at: comm.created_at.clone(),
                last_body: comm.body.clone(),
                unread_count: (!comm.is_read && comm.direction == Direction::Inbound) as u32,
            }
        })
        .collect();
    drop(db);

    let threads = search::merge_threads(summaries)
        .into_iter()
        .map(|thread| {
            let reply_subject = subjects
                .get(&thread.last_message_id)
                .map(|s| search::format_reply_subject(s));
            ThreadView {
                thread,
                reply_subject,
            }
        })
        .collect();
    Ok(Json(threads))
}

/// Display name of the attributed contact, when any.
fn contact_name(db: &crate::db::CommsDb, comm: &DbCommunication) -> Option<String> {
    if let Some(lead_id) = &comm.lead_id {
        return db.get_lead(lead_id).ok().flatten().map(|l| l.name);
    }
    if let Some(owner_id) = &comm.owner_id {
        return db.get_owner(owner_id).ok().flatten().map(|o| o.name);
    }
    None
}

// ============================================================================
// Read state
// ============================================================================

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth::authenticate(&state, &headers).await?;

    let matched = state.db.lock().mark_communication_read(&id)?;
    if !matched {
        return Err(ApiError::NotFound("communication".to_string()));
    }
    let _ = state.events.send(CommsEvent::CommunicationUpdated { id });
    state.debouncer.notify();
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Soft-archive: the row leaves every listing but is never deleted.
pub async fn archive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth::authenticate(&state, &headers).await?;

    let matched = state.db.lock().archive_communication(&id)?;
    if !matched {
        return Err(ApiError::NotFound("communication".to_string()));
    }
    let _ = state.events.send(CommsEvent::CommunicationUpdated { id });
    state.debouncer.notify();
    Ok(Json(serde_json::json!({ "success": true })))
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<Json<Vec<crate::db::DbNotification>>> {
    let authed = auth::authenticate(&state, &headers).await?;
    let user_id = query.user_id.unwrap_or(authed.user_id);
    Ok(Json(state.db.lock().get_notifications(&user_id)?))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth::authenticate(&state, &headers).await?;
    let matched = state.db.lock().mark_notification_read(&id)?;
    if !matched {
        return Err(ApiError::NotFound("notification".to_string()));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
