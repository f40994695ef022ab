//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! models in `sentinel_api` (which have `#[serde(rename)]` for camelCase etc.).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored user record.
///
/// `email_ciphertext` is AES-256-GCM encrypted; lookups go through
/// `email_index`, a keyed digest of the normalised address.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email_ciphertext: Option<String>,
    pub email_index: Option<String>,
    pub password_hash: String,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub is_disabled: bool,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Current position in the MFA enrollment state machine.
    pub fn mfa_state(&self) -> MfaState {
        match (self.mfa_enabled, self.mfa_secret.is_some()) {
            (true, true) => MfaState::Enabled,
            (false, true) => MfaState::PendingSecret,
            _ => MfaState::Disabled,
        }
    }
}

/// MFA enrollment state derived from `(mfa_enabled, mfa_secret)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    PendingSecret,
    Enabled,
}

/// Insert payload for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email_ciphertext: Option<String>,
    pub email_index: Option<String>,
    pub password_hash: String,
}

/// One active login. `token_hash` is the SHA-256 digest of the refresh token.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Insert payload for a new session. The id is chosen by the caller so the
/// tokens minted for the login can carry it.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Client metadata captured at login and refresh.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Token class, carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerify,
}

/// JWT claims shared by every token class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Username, present on access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub typ: TokenKind,
    /// Session the token belongs to; set on access and refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
    /// Unique token id; keeps tokens minted in the same second distinct.
    pub jti: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Identity resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    /// Login session behind the token, ended on logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

/// Freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Newly minted access token from a refresh.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a token introspection query. Never carries a failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<TokenClaims>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self {
            active: false,
            claims: None,
        }
    }
}

/// Material handed to the user when MFA enrollment begins.
#[derive(Debug, Clone)]
pub struct MfaEnrollmentTicket {
    /// Base32 shared secret.
    pub secret: String,
    pub otpauth_uri: String,
    /// `data:image/png;base64,...`
    pub qr_code_image: String,
}

/// Login branch: either a second factor is needed or tokens were issued.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    MfaRequired,
    Authenticated(TokenPair),
}

/// Account details safe to return to the account owner. The email address
/// is decrypted.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub mfa_state: MfaState,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}
