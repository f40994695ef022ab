//! TOTP second factor and its per-user state machine:
//! `Disabled -> PendingSecret -> Enabled`, and `Enabled -> Disabled`.
//!
//! Codes are RFC 6238 SHA-1, 6 digits, 30 second step, accepting one step
//! of clock skew either way. Shared secrets are stored AES-GCM encrypted
//! under the engine's encryption key.

use std::sync::Arc;

use totp_rs::{Algorithm, Secret, TOTP};
use tracing::info;
use uuid::Uuid;

use super::AuthError;
use super::crypto::{decrypt, encrypt};
use crate::config::AuthConfig;
use crate::models::auth::{MfaEnrollmentTicket, MfaState, User};
use crate::store::AuthStore;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

/// Build a TOTP from a base32 secret.
///
/// The account name must not contain `:`, which would break the otpauth
/// label, so any are replaced.
fn totp(secret_b32: &str, issuer: Option<&str>, account: &str) -> Result<TOTP, AuthError> {
    let bytes = Secret::Encoded(secret_b32.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Internal(format!("TOTP secret decode: {e:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        bytes,
        issuer.map(str::to_string),
        account.replace(':', "_"),
    )
    .map_err(|e| AuthError::Internal(format!("TOTP init: {e}")))
}

/// Check `code` against `secret_b32` at the current time. No state changes.
pub fn verify_login_code(secret_b32: &str, code: &str) -> bool {
    match totp(secret_b32, None, "sentinel") {
        Ok(t) => t.check_current(code.trim()).unwrap_or(false),
        Err(_) => false,
    }
}

/// Drives MFA enrollment for users.
pub struct MfaEnrollment {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
}

impl MfaEnrollment {
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// The user's base32 secret, pending or enabled, decrypted.
    pub fn secret_for(&self, user: &User) -> Result<Option<String>, AuthError> {
        user.mfa_secret
            .as_deref()
            .map(|sealed| decrypt(sealed, &self.config.encryption_key))
            .transpose()
    }

    /// Generate a fresh secret and store it as pending.
    ///
    /// Restarting from `PendingSecret` replaces the pending secret. Users
    /// with MFA already enabled must disable it first.
    pub async fn begin_enrollment(&self, user_id: Uuid) -> Result<MfaEnrollmentTicket, AuthError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.mfa_state() == MfaState::Enabled {
            return Err(AuthError::Validation("MFA is already enabled".into()));
        }

        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = totp(&secret, Some(&self.config.mfa_issuer), &user.username)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| AuthError::Internal(format!("QR generation: {e}")))?;
        let otpauth_uri = totp.get_url();

        let sealed = encrypt(&secret, &self.config.encryption_key)?;
        if !self.store.set_mfa(user_id, Some(&sealed), false).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(%user_id, "MFA enrollment started");

        Ok(MfaEnrollmentTicket {
            secret,
            otpauth_uri,
            qr_code_image: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Enable MFA if `code` matches the pending secret. A wrong code leaves
    /// the secret pending so the user can retry.
    pub async fn confirm_enrollment(&self, user_id: Uuid, code: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let secret = self
            .secret_for(&user)?
            .ok_or_else(|| AuthError::Validation("MFA enrollment has not been started".into()))?;

        if !verify_login_code(&secret, code) {
            return Err(AuthError::InvalidMfaToken);
        }

        self.store
            .set_mfa(user_id, user.mfa_secret.as_deref(), true)
            .await?;
        info!(%user_id, "MFA enabled");
        Ok(())
    }

    /// Clear MFA unconditionally. Succeeds when already disabled.
    pub async fn disable(&self, user_id: Uuid) -> Result<(), AuthError> {
        if !self.store.set_mfa(user_id, None, false).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(%user_id, "MFA disabled");
        Ok(())
    }
}
