//! Authentication engine.
//!
//! Credential verification, MFA enrollment, token lifecycle and session
//! bookkeeping, plus `flow`, which sequences them into login/refresh/logout.

pub mod credentials;
pub mod crypto;
pub mod flow;
pub mod mfa;
pub mod password;
pub mod sessions;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
///
/// Every variant except `Validation`, `Internal` and `Store` is a kind the
/// HTTP layer maps to a fixed, generic message.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid MFA token")]
    InvalidMfaToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token blacklisted")]
    TokenBlacklisted,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("User not found")]
    UserNotFound,

    #[error("User already exists")]
    DuplicateUser,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(constraint) if constraint.starts_with("users_") => {
                AuthError::DuplicateUser
            }
            StoreError::Conflict(constraint) => {
                AuthError::Internal(format!("unexpected conflict on {constraint}"))
            }
            other => AuthError::Store(other),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Store(StoreError::Db(e))
    }
}
