//! Authentication and authorization helpers.
//!
//! Three mechanisms, matching the callers they serve:
//! - Bearer token, validated against the hosted auth service, for
//!   interactive API clients.
//! - `x-api-key` static header for server-to-server integrations.
//! - Role lookup (`user_roles` table) for admin-gated endpoints, cached
//!   in an explicit `RoleCache` that is invalidated on auth-state change
//!   instead of memoized in a module global.

use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    /// Set when the caller authenticated with the static API key rather
    /// than a bearer token. API-key callers bypass role checks.
    pub via_api_key: bool,
}

// =============================================================================
// Role cache
// =============================================================================

/// Session-scoped role memoization with explicit invalidation.
pub struct RoleCache {
    roles: DashMap<String, Vec<String>>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self {
            roles: DashMap::new(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Vec<String>> {
        self.roles.get(user_id).map(|r| r.value().clone())
    }

    pub fn insert(&self, user_id: &str, roles: Vec<String>) {
        self.roles.insert(user_id.to_string(), roles);
    }

    /// Drop one user cached role set. Call on role grant/revoke.
    pub fn invalidate(&self, user_id: &str) {
        self.roles.remove(user_id);
    }

    /// Drop everything. Call on auth-state change.
    pub fn clear(&self) {
        self.roles.clear();
    }
}

impl Default for RoleCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, Deserialize)]
struct AuthServiceUser {
    id: String,
}

/// Authenticate a request: the static API key short-circuits, otherwise
/// the bearer token is validated against the configured auth service.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, ApiError> {
    let (configured_key, auth_base) = {
        let config = state.config.read();
        (config.auth.api_key.clone(), config.auth.base_url.clone())
    };

    if let Some(expected) = configured_key {
        if let Some(provided) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            if provided == expected {
                return Ok(AuthedUser {
                    user_id: "service".to_string(),
                    via_api_key: true,
                });
            }
            // A wrong key is a hard failure, not a fall-through to bearer
            return Err(ApiError::Unauthorized);
        }
    }

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let Some(base_url) = auth_base else {
        log::warn!("Auth: bearer token presented but no auth service configured");
        return Err(ApiError::Unauthorized);
    };

    let response = reqwest::Client::new()
        .get(format!("{}/user", base_url.trim_end_matches('/')))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("Auth service unreachable: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::Unauthorized);
    }

    let user: AuthServiceUser = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("Auth service response: {}", e)))?;

    Ok(AuthedUser {
        user_id: user.id,
        via_api_key: false,
    })
}

/// Admin gate. Roles come from the cache when warm, the store otherwise.
pub fn require_admin(state: &AppState, user: &AuthedUser) -> Result<(), ApiError> {
    if user.via_api_key {
        return Ok(());
    }

    let roles = match state.role_cache.get(&user.user_id) {
        Some(roles) => roles,
        None => {
            let roles = state.db.lock().get_user_roles(&user.user_id)?;
            state.role_cache.insert(&user.user_id, roles.clone());
            roles
        }
    };

    if roles.iter().any(|r| r == ADMIN_ROLE) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(ADMIN_ROLE.to_string()))
    }
}
