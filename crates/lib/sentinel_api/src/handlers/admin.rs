//! Administrative session control over other users.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{RevokeAllResponse, SessionListResponse};

const READ_SESSIONS: &str = "read:sessions";
const ADMIN_SESSIONS: &str = "admin:sessions";

/// `GET /admin/users/{id}/sessions`. Requires `read:sessions`.
pub async fn list_user_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(target): Path<Uuid>,
) -> AppResult<Json<SessionListResponse>> {
    state
        .auth
        .permissions()
        .require(user.principal.user_id, READ_SESSIONS)
        .await?;
    let sessions = state.auth.sessions().list_active(target).await?;
    Ok(Json(SessionListResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// `DELETE /admin/users/{id}/sessions`. Requires `admin:sessions`.
pub async fn revoke_user_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(target): Path<Uuid>,
) -> AppResult<Json<RevokeAllResponse>> {
    state
        .auth
        .permissions()
        .require(user.principal.user_id, ADMIN_SESSIONS)
        .await?;
    let revoked = state.auth.sessions().revoke_all(target).await?;
    tracing::info!(admin = %user.principal.user_id, %target, revoked, "sessions revoked by admin");
    Ok(Json(RevokeAllResponse { revoked }))
}
