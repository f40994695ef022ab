//! TOTP enrollment handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{MfaConfirmRequest, MfaEnrollResponse, SuccessResponse};

/// `POST /auth/mfa/enroll`: start enrollment and return the shared secret.
pub async fn enroll_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MfaEnrollResponse>> {
    let ticket = state
        .auth
        .mfa()
        .begin_enrollment(user.principal.user_id)
        .await?;
    Ok(Json(MfaEnrollResponse {
        secret: ticket.secret,
        otpauth_uri: ticket.otpauth_uri,
        qr_code_image: ticket.qr_code_image,
    }))
}

/// `POST /auth/mfa/confirm`: enable MFA with a first valid code.
pub async fn confirm_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<MfaConfirmRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state
        .auth
        .mfa()
        .confirm_enrollment(user.principal.user_id, &body.code)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// `POST /auth/mfa/disable`
pub async fn disable_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<SuccessResponse>> {
    state.auth.mfa().disable(user.principal.user_id).await?;
    Ok(Json(SuccessResponse::ok()))
}
