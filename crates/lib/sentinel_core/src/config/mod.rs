//! Engine configuration.
//!
//! `AuthConfig` is built once at process start and handed by reference to
//! every component; nothing reads keys from global state.

pub mod secrets;

use std::fmt;

use chrono::Duration;

use crate::auth::AuthError;

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Email verification token lifetime: 24 hours.
pub const DEFAULT_EMAIL_VERIFY_TTL_SECS: i64 = 24 * 60 * 60;

/// Maximum live sessions per user.
pub const DEFAULT_SESSION_LIMIT: usize = 5;

/// Configuration for the authentication engine.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret for access and email-verification tokens.
    pub access_secret: String,
    /// HS256 secret for refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub email_verify_ttl: Duration,
    pub session_limit: usize,
    /// Issuer shown in authenticator apps.
    pub mfa_issuer: String,
    /// Passphrase for email encryption and the email blind index.
    pub encryption_key: String,
    /// Grant cache TTL; 0 disables caching.
    pub permission_cache_ttl_ms: i64,
}

impl AuthConfig {
    /// Config with default lifetimes and limits.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        encryption_key: impl Into<String>,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            email_verify_ttl: Duration::seconds(DEFAULT_EMAIL_VERIFY_TTL_SECS),
            session_limit: DEFAULT_SESSION_LIMIT,
            mfa_issuer: "Sentinel".to_string(),
            encryption_key: encryption_key.into(),
            permission_cache_ttl_ms: 0,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                  | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `ACCESS_TOKEN_SECRET`     | generated & persisted to file  |
    /// | `REFRESH_TOKEN_SECRET`    | generated & persisted to file  |
    /// | `EMAIL_ENCRYPTION_KEY`    | generated & persisted to file  |
    /// | `ACCESS_TOKEN_TTL_SECS`   | `900`                          |
    /// | `REFRESH_TOKEN_TTL_SECS`  | `604800`                       |
    /// | `SESSION_LIMIT`           | `5`                            |
    /// | `MFA_ISSUER`              | `Sentinel`                     |
    /// | `PERMISSION_CACHE_TTL_MS` | `0`                            |
    ///
    /// Fails when a secret has to be generated but cannot be persisted.
    pub fn from_env() -> Result<Self, AuthError> {
        let secret = |var: &str, name: &str| {
            secrets::resolve_secret(var, name).map_err(|e| AuthError::Internal(e.to_string()))
        };
        let mut config = Self::new(
            secret("ACCESS_TOKEN_SECRET", "access-secret")?,
            secret("REFRESH_TOKEN_SECRET", "refresh-secret")?,
            secret("EMAIL_ENCRYPTION_KEY", "encryption-key")?,
        );
        config.access_ttl =
            Duration::seconds(env_or("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS));
        config.refresh_ttl =
            Duration::seconds(env_or("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS));
        config.session_limit = env_or("SESSION_LIMIT", DEFAULT_SESSION_LIMIT);
        config.permission_cache_ttl_ms = env_or("PERMISSION_CACHE_TTL_MS", 0);
        if let Ok(issuer) = std::env::var("MFA_ISSUER")
            && !issuer.is_empty()
        {
            config.mfa_issuer = issuer;
        }
        Ok(config)
    }

    /// Reject configurations that would weaken the engine.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(AuthError::Validation("token secrets must not be empty".into()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(AuthError::Validation(
                "access and refresh secrets must differ".into(),
            ));
        }
        if self.encryption_key.is_empty() {
            return Err(AuthError::Validation("encryption key must not be empty".into()));
        }
        if self.session_limit == 0 {
            return Err(AuthError::Validation("session limit must be at least 1".into()));
        }
        if self.access_ttl <= Duration::zero() || self.refresh_ttl <= Duration::zero() {
            return Err(AuthError::Validation("token lifetimes must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("email_verify_ttl", &self.email_verify_ttl)
            .field("session_limit", &self.session_limit)
            .field("mfa_issuer", &self.mfa_issuer)
            .field("encryption_key", &"<redacted>")
            .field("permission_cache_ttl_ms", &self.permission_cache_ttl_ms)
            .finish()
    }
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AuthConfig::new("a", "r", "k");
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert_eq!(config.session_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shared_secrets_are_rejected() {
        let config = AuthConfig::new("same", "same", "k");
        assert!(matches!(config.validate(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn zero_session_limit_is_rejected() {
        let mut config = AuthConfig::new("a", "r", "k");
        config.session_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", AuthConfig::new("top-secret-a", "top-secret-r", "key"));
        assert!(!rendered.contains("top-secret"));
    }
}
