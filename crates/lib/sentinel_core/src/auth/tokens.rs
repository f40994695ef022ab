//! Token lifecycle: issuance, verification, refresh, blacklisting and
//! introspection of HS256 JWTs.
//!
//! Access and refresh tokens are signed with distinct secrets, and each
//! carries a `typ` claim that is checked on decode, so neither class can
//! stand in for the other.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use super::crypto::hash_token;
use crate::config::AuthConfig;
use crate::models::auth::{
    AccessToken, Introspection, Principal, Session, TokenClaims, TokenKind, TokenPair, User,
};
use crate::store::AuthStore;

/// Issues and checks tokens. Session persistence belongs to `SessionStore`.
pub struct TokenLifecycleManager {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
}

impl TokenLifecycleManager {
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// Sign an access/refresh pair for `user`, both bound to `session_id`.
    /// No side effects; the caller persists the session under that id.
    pub fn issue(&self, user: &User, session_id: Uuid) -> Result<TokenPair, AuthError> {
        let access = self.issue_access(user.id, &user.username, session_id)?;
        let now = Utc::now();
        let refresh_expires_at = now + self.config.refresh_ttl;
        let refresh_claims = claims(
            user.id,
            None,
            Some(session_id),
            TokenKind::Refresh,
            now,
            refresh_expires_at,
        );
        let refresh_token = sign(&refresh_claims, self.config.refresh_secret.as_bytes())?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            access_expires_at: access.expires_at,
            refresh_expires_at,
        })
    }

    fn issue_access(
        &self,
        user_id: Uuid,
        username: &str,
        session_id: Uuid,
    ) -> Result<AccessToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.config.access_ttl;
        let access_claims = claims(
            user_id,
            Some(username),
            Some(session_id),
            TokenKind::Access,
            now,
            expires_at,
        );
        let token = sign(&access_claims, self.config.access_secret.as_bytes())?;
        Ok(AccessToken { token, expires_at })
    }

    /// Verify an access token and resolve its principal.
    ///
    /// Signature and expiry are checked before the blacklist is consulted, so
    /// forged or stale tokens never cost a store round trip.
    pub async fn verify_access(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.verify_access_claims(token).await?;
        principal_from(&claims)
    }

    async fn verify_access_claims(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = decode_claims(
            token,
            self.config.access_secret.as_bytes(),
            TokenKind::Access,
        )?;
        if self.store.is_blacklisted(&hash_token(token)).await? {
            debug!(jti = %claims.jti, "rejected blacklisted access token");
            return Err(AuthError::TokenBlacklisted);
        }
        Ok(claims)
    }

    /// Mint a new access token from a refresh token backed by a live session.
    ///
    /// The refresh token itself is not rotated. Returns the backing session
    /// so the caller can touch it.
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(AccessToken, Session), AuthError> {
        let claims = decode_claims(
            refresh_token,
            self.config.refresh_secret.as_bytes(),
            TokenKind::Refresh,
        )?;
        let user_id = parse_subject(&claims)?;

        let session = self
            .store
            .find_live_session_by_token(&hash_token(refresh_token), Utc::now())
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if session.user_id != user_id || claims.sid.is_some_and(|sid| sid != session.id) {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .store
            .get_user(user_id)
            .await?
            .filter(|u| !u.is_disabled)
            .ok_or(AuthError::InvalidToken)?;

        let access = self.issue_access(user.id, &user.username, session.id)?;
        Ok((access, session))
    }

    /// Record `token` as revoked until its own expiry.
    ///
    /// The expiry claim is read without checking the signature: the caller
    /// has already authenticated the token, and it may expire in between.
    pub async fn blacklist(&self, token: &str) -> Result<(), AuthError> {
        let claims = decode_unverified(token)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;
        self.store
            .insert_blacklisted(&hash_token(token), expires_at)
            .await?;
        debug!(jti = %claims.jti, %expires_at, "blacklisted token");
        Ok(())
    }

    /// Report whether an access token is currently valid, without a reason
    /// when it is not.
    pub async fn introspect(&self, token: &str) -> Introspection {
        match self.verify_access_claims(token).await {
            Ok(claims) => Introspection {
                active: true,
                claims: Some(claims),
            },
            Err(e) => {
                debug!(error = %e, "introspection reported inactive token");
                Introspection::inactive()
            }
        }
    }

    /// Delete blacklist rows whose token has expired anyway.
    pub async fn prune_blacklist(&self) -> Result<u64, AuthError> {
        Ok(self.store.delete_expired_blacklisted(Utc::now()).await?)
    }

    /// Sign a single-purpose email verification token for `user_id`.
    pub fn issue_email_verification(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let verify_claims = claims(
            user_id,
            None,
            None,
            TokenKind::EmailVerify,
            now,
            now + self.config.email_verify_ttl,
        );
        sign(&verify_claims, self.config.access_secret.as_bytes())
    }

    /// Check an email verification token, returning its subject.
    pub fn verify_email_verification(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = decode_claims(
            token,
            self.config.access_secret.as_bytes(),
            TokenKind::EmailVerify,
        )?;
        parse_subject(&claims)
    }
}

fn claims(
    user_id: Uuid,
    username: Option<&str>,
    session_id: Option<Uuid>,
    typ: TokenKind,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> TokenClaims {
    TokenClaims {
        sub: user_id.to_string(),
        username: username.map(str::to_string),
        typ,
        sid: session_id,
        jti: Uuid::new_v4().to_string(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
    }
}

fn sign(claims: &TokenClaims, secret: &[u8]) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

/// Verify signature, expiry (zero leeway) and token class.
fn decode_claims(
    token: &str,
    secret: &[u8],
    expected: TokenKind,
) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

    if data.claims.typ != expected {
        return Err(AuthError::InvalidToken);
    }
    Ok(data.claims)
}

/// Read claims without checking signature or expiry.
fn decode_unverified(token: &str) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
}

fn parse_subject(claims: &TokenClaims) -> Result<Uuid, AuthError> {
    Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
}

fn principal_from(claims: &TokenClaims) -> Result<Principal, AuthError> {
    Ok(Principal {
        user_id: parse_subject(claims)?,
        username: claims.username.clone().ok_or(AuthError::InvalidToken)?,
        session_id: claims.sid,
    })
}

/// Seconds until `expires_at`, floored at zero.
pub fn seconds_until(expires_at: DateTime<Utc>) -> i64 {
    (expires_at - Utc::now()).max(Duration::zero()).num_seconds()
}
