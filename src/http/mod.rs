//! HTTP surface: provider webhooks, outbound sends, inbox queries,
//! payments, and admin endpoints.
//!
//! Webhook routes are open (providers can't do bearer auth); everything
//! else authenticates via bearer token or the static API key. Handlers
//! stay thin: parse, call into the store/ingest/provider layers, map
//! errors through `ApiError`.

pub mod admin;
pub mod messages;
pub mod payments;
pub mod webhooks;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Provider webhooks: open, always acknowledge
        .route("/webhooks/telnyx/sms", post(webhooks::telnyx_sms))
        .route("/webhooks/telnyx/voicemail", post(webhooks::telnyx_voicemail))
        .route("/webhooks/twilio/call-status", post(webhooks::twilio_call_status))
        .route("/webhooks/signwell", post(webhooks::signwell))
        .route("/webhooks/crm/phone-numbers", post(webhooks::crm_phone_numbers))
        // Outbound sends
        .route("/messages/sms", post(messages::send_sms))
        .route("/messages/email", post(messages::send_email))
        // Inbox
        .route("/communications", get(messages::list_communications))
        .route("/communications/search", get(messages::search_communications))
        .route("/communications/threads", get(messages::list_threads))
        .route("/communications/{id}/read", post(messages::mark_read))
        .route("/communications/{id}/archive", post(messages::archive))
        .route("/notifications", get(messages::list_notifications))
        .route("/notifications/{id}/read", post(messages::mark_notification_read))
        // Payments
        .route("/payments/setup", post(payments::create_lead_setup))
        .route("/payments/owner-setup", post(payments::create_owner_setup))
        .route("/payments/methods", get(payments::list_methods))
        // Admin + misc
        .route("/assignments", post(admin::assign_phone))
        .route("/roles", post(admin::grant_role))
        .route("/sync/run", post(admin::trigger_sync))
        .route(
            "/tone-profiles/{user_id}",
            get(admin::get_tone_profile).put(admin::put_tone_profile),
        )
        .route("/snippets", get(admin::list_snippets).post(admin::create_snippet))
        .route("/snippets/{id}/use", post(admin::use_snippet))
        .route("/health", get(admin::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Shared result alias for handler signatures.
pub type ApiResult<T> = Result<T, crate::error::ApiError>;
