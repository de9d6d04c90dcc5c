//! Error types for the HTTP API surface
//!
//! Errors are classified by origin:
//! - Validation: malformed or incomplete request input
//! - Auth: missing/invalid credentials or insufficient role
//! - Upstream: a provider API (Telnyx, Stripe, SignWell, ...) returned non-2xx
//! - Internal: everything else (store failures, broken invariants)
//!
//! Webhook handlers never return these to the calling provider; they
//! acknowledge with 2xx and log instead, to avoid redelivery storms.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Insufficient role: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status this error maps to. Upstream errors re-surface the
    /// provider's status where it is a valid HTTP code, defaulting to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true if retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Upstream { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ApiError::Internal(_) => true,
            _ => false,
        }
    }
}

impl From<String> for ApiError {
    fn from(s: String) -> Self {
        ApiError::Internal(s)
    }
}

impl From<crate::providers::ProviderError> for ApiError {
    fn from(err: crate::providers::ProviderError) -> Self {
        match err {
            crate::providers::ProviderError::Api { status, message } => {
                ApiError::Upstream { status, message }
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
