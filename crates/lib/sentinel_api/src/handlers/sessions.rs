//! Session management for the signed-in user.

use axum::Json;
use axum::extract::{Path, State};
use sentinel_core::auth::AuthError;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{RevokeAllResponse, SessionListResponse, SuccessResponse};

/// `GET /auth/sessions`: active sessions, most recently used first.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<SessionListResponse>> {
    let sessions = state
        .auth
        .sessions()
        .list_active(user.principal.user_id)
        .await?;
    Ok(Json(SessionListResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// `DELETE /auth/sessions/{id}`: log out one device.
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    state
        .auth
        .sessions()
        .revoke(user.principal.user_id, session_id)
        .await
        .map_err(|e| match e {
            AuthError::SessionNotFound => AppError::NotFound("session not found".into()),
            other => other.into(),
        })?;
    Ok(Json(SuccessResponse::ok()))
}

/// `DELETE /auth/sessions`: log out everywhere.
pub async fn revoke_all_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<RevokeAllResponse>> {
    let revoked = state
        .auth
        .sessions()
        .revoke_all(user.principal.user_id)
        .await?;
    Ok(Json(RevokeAllResponse { revoked }))
}
