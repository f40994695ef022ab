//! Authentication middleware: bearer tokens for users, API keys for
//! trusted backends.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sentinel_core::auth::crypto::constant_time_eq;
use sentinel_core::models::auth::Principal;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Header carrying a backend API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request extension set by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    /// The verified access token, kept so logout can blacklist it.
    pub access_token: String,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it,
/// and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?.to_string();
    let principal = state.auth.principal(&token).await.map_err(|e| {
        debug!(error = %e, "bearer token rejected");
        AppError::from(e)
    })?;

    request.extensions_mut().insert(AuthenticatedUser {
        principal,
        access_token: token,
    });
    Ok(next.run(request).await)
}

/// Axum middleware: accepts requests whose `X-API-Key` matches one of the
/// configured keys. With no keys configured every request is refused.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing API key".into()))?;

    let accepted = state
        .config
        .introspection_api_keys
        .iter()
        .fold(false, |hit, key| {
            constant_time_eq(key.as_bytes(), presented.as_bytes()) | hit
        });
    if !accepted {
        return Err(AppError::Unauthorized("Invalid API key".into()));
    }
    Ok(next.run(request).await)
}
