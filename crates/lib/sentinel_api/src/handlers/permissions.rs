//! Permission checks for the signed-in user.

use axum::Json;
use axum::extract::{Query, State};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PermissionCheckQuery, PermissionCheckResponse};

/// `GET /auth/permissions/check?permission=type:resource`
pub async fn check_permission_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<PermissionCheckQuery>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let allowed = state
        .auth
        .permissions()
        .check_permission(user.principal.user_id, &query.permission)
        .await?;
    Ok(Json(PermissionCheckResponse {
        permission: query.permission,
        allowed,
    }))
}
