//! Admin and bookkeeping endpoints: health, phone assignments, roles,
//! manual sync triggers, tone profiles, snippets.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::auth;
use crate::db::{DbPhoneAssignment, DbSnippet, DbToneProfile};
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub communications: i64,
    pub last_sync_at: Option<String>,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let db = state.db.lock();
    let communications = db.count_communications()?;
    let last_sync_at = db.get_last_sync_at()?.map(|t| t.to_rfc3339());
    drop(db);

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        communications,
        last_sync_at,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ============================================================================
// Phone assignments (admin)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPhoneRequest {
    pub phone_number: String,
    pub user_id: String,
}

pub async fn assign_phone(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AssignPhoneRequest>,
) -> ApiResult<Json<DbPhoneAssignment>> {
    let authed = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&state, &authed)?;

    if req.phone_number.trim().is_empty() || req.user_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "phoneNumber and userId are required".to_string(),
        ));
    }

    let assignment = state
        .db
        .lock()
        .assign_phone(&req.phone_number, &req.user_id)?;
    Ok(Json(assignment))
}

// ============================================================================
// Roles (admin)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRoleRequest {
    pub user_id: String,
    pub role: String,
}

pub async fn grant_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GrantRoleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let authed = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&state, &authed)?;

    state.db.lock().grant_role(&req.user_id, &req.role)?;
    // The cache may hold this user's pre-grant roles
    state.role_cache.invalidate(&req.user_id);
    Ok(Json(serde_json::json!({ "success": true })))
}

// ============================================================================
// Manual sync trigger
// ============================================================================

pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    auth::authenticate(&state, &headers).await?;
    state.sync_wake.notify_one();
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "scheduled" })),
    ))
}

// ============================================================================
// Tone profiles
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneProfileRequest {
    pub formality: String,
    pub avg_sentence_length: f64,
    #[serde(default)]
    pub greetings: Vec<String>,
    #[serde(default)]
    pub closings: Vec<String>,
}

pub async fn put_tone_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<ToneProfileRequest>,
) -> ApiResult<Json<DbToneProfile>> {
    auth::authenticate(&state, &headers).await?;

    let profile = DbToneProfile {
        user_id,
        formality: req.formality,
        avg_sentence_length: req.avg_sentence_length,
        greetings: serde_json::to_string(&req.greetings)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        closings: serde_json::to_string(&req.closings)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        analyzed_at: Utc::now().to_rfc3339(),
    };
    state.db.lock().replace_tone_profile(&profile)?;
    Ok(Json(profile))
}

pub async fn get_tone_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<Json<DbToneProfile>> {
    auth::authenticate(&state, &headers).await?;
    state
        .db
        .lock()
        .get_tone_profile(&user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("tone profile".to_string()))
}

// ============================================================================
// Snippets
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnippetRequest {
    pub user_id: String,
    pub shortcut: String,
    pub content: String,
}

pub async fn create_snippet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSnippetRequest>,
) -> ApiResult<Json<DbSnippet>> {
    auth::authenticate(&state, &headers).await?;

    if req.shortcut.trim().is_empty() {
        return Err(ApiError::Validation("shortcut is required".to_string()));
    }

    let now = Utc::now().to_rfc3339();
    let snippet = DbSnippet {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: req.user_id,
        shortcut: req.shortcut,
        content: req.content,
        use_count: 0,
        created_at: now.clone(),
        updated_at: now,
    };
    state.db.lock().upsert_snippet(&snippet)?;
    Ok(Json(snippet))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn list_snippets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SnippetsQuery>,
) -> ApiResult<Json<Vec<DbSnippet>>> {
    let authed = auth::authenticate(&state, &headers).await?;
    let user_id = query.user_id.unwrap_or(authed.user_id);
    Ok(Json(state.db.lock().get_snippets(&user_id)?))
}

pub async fn use_snippet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<DbSnippet>> {
    auth::authenticate(&state, &headers).await?;
    state
        .db
        .lock()
        .use_snippet(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("snippet".to_string()))
}
