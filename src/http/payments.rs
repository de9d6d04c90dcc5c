//! Stripe payment endpoints: setup sessions and method listing.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::auth;
use crate::error::ApiError;
use crate::providers::stripe::{PaymentMethodSummary, StripeClient};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub contact_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub url: String,
}

fn stripe_client(state: &AppState) -> Result<(StripeClient, String), ApiError> {
    let config = state.config.read();
    let secret = config
        .stripe
        .secret_key
        .clone()
        .ok_or_else(|| ApiError::Validation("Stripe is not configured".to_string()))?;
    let return_url = config
        .stripe
        .return_url
        .clone()
        .ok_or_else(|| ApiError::Validation("no Stripe return URL configured".to_string()))?;
    Ok((StripeClient::new(&secret), return_url))
}

async fn create_setup_for(
    state: &AppState,
    email: &str,
    name: &str,
) -> Result<SetupResponse, ApiError> {
    let (client, return_url) = stripe_client(state)?;
    let customer_id = client.find_or_create_customer(email, name).await?;
    let session = client.create_setup_session(&customer_id, &return_url).await?;
    let url = session
        .url
        .ok_or_else(|| ApiError::Internal("checkout session has no redirect url".to_string()))?;
    Ok(SetupResponse { url })
}

/// Start a card/ACH setup flow for a lead.
pub async fn create_lead_setup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetupRequest>,
) -> ApiResult<Json<SetupResponse>> {
    auth::authenticate(&state, &headers).await?;

    let lead = state
        .db
        .lock()
        .get_lead(&req.contact_id)?
        .ok_or_else(|| ApiError::NotFound("lead".to_string()))?;
    let email = lead
        .email
        .ok_or_else(|| ApiError::Validation("lead has no email on file".to_string()))?;

    Ok(Json(create_setup_for(&state, &email, &lead.name).await?))
}

/// Start a card/ACH setup flow for a property owner.
pub async fn create_owner_setup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetupRequest>,
) -> ApiResult<Json<SetupResponse>> {
    auth::authenticate(&state, &headers).await?;

    let owner = state
        .db
        .lock()
        .get_owner(&req.contact_id)?
        .ok_or_else(|| ApiError::NotFound("owner".to_string()))?;
    let email = owner
        .email
        .ok_or_else(|| ApiError::Validation("owner has no email on file".to_string()))?;

    Ok(Json(create_setup_for(&state, &email, &owner.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub customer: String,
}

pub async fn list_methods(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MethodsQuery>,
) -> ApiResult<Json<Vec<PaymentMethodSummary>>> {
    auth::authenticate(&state, &headers).await?;

    let secret = state
        .config
        .read()
        .stripe
        .secret_key
        .clone()
        .ok_or_else(|| ApiError::Validation("Stripe is not configured".to_string()))?;

    let methods = StripeClient::new(&secret)
        .list_payment_methods(&query.customer)
        .await?;
    Ok(Json(methods))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_utils::test_state;

    fn service_headers(state: &AppState) -> HeaderMap {
        state.config.write().auth.api_key = Some("test-key".to_string());
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "test-key".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_setup_unknown_lead_is_404() {
        let state = test_state();
        state.config.write().stripe.secret_key = Some("sk_test".to_string());
        state.config.write().stripe.return_url = Some("https://app.example.com/billing".to_string());
        let headers = service_headers(&state);

        let result = create_lead_setup(
            State(state),
            headers,
            Json(SetupRequest {
                contact_id: "ghost".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_setup_without_stripe_config_is_validation_error() {
        let state = test_state();
        let headers = service_headers(&state);
        state
            .db
            .lock()
            .upsert_lead(&crate::db::contacts::tests::sample_lead("lead-1", "4045551234"))
            .expect("lead");

        let result = create_lead_setup(
            State(state),
            headers,
            Json(SetupRequest {
                contact_id: "lead-1".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
