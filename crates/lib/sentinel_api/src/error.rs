//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sentinel_core::auth::AuthError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

const INVALID_CREDENTIALS: &str = "invalid credentials";
const REAUTHENTICATE: &str = "unauthorized, please re-authenticate";

/// Application-level errors with HTTP status mapping.
///
/// Messages are fixed per kind; store and internal details only reach the
/// log.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "forbidden"),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::InvalidMfaToken => {
                AppError::Unauthorized(INVALID_CREDENTIALS.into())
            }
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::TokenBlacklisted
            | AuthError::SessionNotFound => AppError::Unauthorized(REAUTHENTICATE.into()),
            AuthError::PermissionDenied => AppError::Forbidden,
            AuthError::UserNotFound => AppError::NotFound("user not found".into()),
            AuthError::DuplicateUser => AppError::Conflict("user already exists".into()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Internal(msg) => AppError::Internal(msg),
            AuthError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: AuthError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn auth_kinds_map_to_statuses() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::TokenBlacklisted), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AuthError::DuplicateUser), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AuthError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn credential_failures_share_one_message() {
        let a = AppError::from(AuthError::InvalidCredentials).to_string();
        let b = AppError::from(AuthError::InvalidMfaToken).to_string();
        assert_eq!(a, b);
    }
}
