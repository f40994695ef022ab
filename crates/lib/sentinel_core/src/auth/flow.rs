//! Login, refresh, logout and registration, sequenced over the engine's
//! components.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use super::credentials::CredentialVerifier;
use super::crypto::{blind_index, decrypt, encrypt, normalize_email};
use super::mfa::{MfaEnrollment, verify_login_code};
use super::password::hash_password;
use super::sessions::SessionStore;
use super::tokens::TokenLifecycleManager;
use crate::config::AuthConfig;
use crate::models::auth::{
    AccessToken, ClientInfo, LoginOutcome, NewUser, Principal, User, UserProfile,
};
use crate::models::rbac::SUPER_ROLE;
use crate::notify::Notifier;
use crate::rbac::PermissionResolver;
use crate::store::AuthStore;
use crate::uuid::uuidv7;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

/// Entry point for transports. Owns one of each engine component, all
/// sharing the same store and configuration.
pub struct Authenticator {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
    notifier: Arc<dyn Notifier>,
    credentials: CredentialVerifier,
    mfa: MfaEnrollment,
    tokens: Arc<TokenLifecycleManager>,
    sessions: Arc<SessionStore>,
    permissions: PermissionResolver,
}

impl Authenticator {
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);
        Self {
            credentials: CredentialVerifier::new(store.clone(), config.clone()),
            mfa: MfaEnrollment::new(store.clone(), config.clone()),
            tokens: Arc::new(TokenLifecycleManager::new(store.clone(), config.clone())),
            sessions: Arc::new(SessionStore::new(store.clone(), config.session_limit)),
            permissions: PermissionResolver::with_cache(
                store.clone(),
                config.permission_cache_ttl_ms,
            ),
            store,
            config,
            notifier,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenLifecycleManager> {
        &self.tokens
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn mfa(&self) -> &MfaEnrollment {
        &self.mfa
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    /// Verify credentials, then the second factor if enabled, then issue a
    /// token pair backed by a new session.
    ///
    /// An MFA user who supplies no code gets `MfaRequired`; no tokens are
    /// issued and no session is created.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        mfa_code: Option<&str>,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let user = self.credentials.verify(identifier, password).await?;

        if user.mfa_enabled {
            let Some(code) = mfa_code else {
                info!(user_id = %user.id, "login requires MFA code");
                return Ok(LoginOutcome::MfaRequired);
            };
            let secret = self.mfa.secret_for(&user)?.ok_or(AuthError::InvalidMfaToken)?;
            if !verify_login_code(&secret, code) {
                warn!(user_id = %user.id, "login with invalid MFA code");
                return Err(AuthError::InvalidMfaToken);
            }
        }

        let session_id = uuidv7();
        let pair = self.tokens.issue(&user, session_id)?;
        self.sessions
            .create_session(
                session_id,
                user.id,
                &pair.refresh_token,
                pair.refresh_expires_at,
                client,
            )
            .await?;
        info!(user_id = %user.id, %session_id, "login succeeded");
        Ok(LoginOutcome::Authenticated(pair))
    }

    /// New access token for a refresh token; marks its session used by
    /// `client`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<AccessToken, AuthError> {
        let (access, session) = self.tokens.refresh(refresh_token).await?;
        self.sessions.touch(session.id, client).await?;
        Ok(access)
    }

    /// Blacklist the access token and end the session it was issued for.
    /// A session already evicted or revoked is not an error.
    pub async fn logout(&self, principal: &Principal, access_token: &str) -> Result<(), AuthError> {
        self.tokens.blacklist(access_token).await?;
        if let Some(session_id) = principal.session_id {
            match self.sessions.revoke(principal.user_id, session_id).await {
                Ok(()) | Err(AuthError::SessionNotFound) => {}
                Err(e) => return Err(e),
            }
        }
        info!(user_id = %principal.user_id, session_id = ?principal.session_id, "logout");
        Ok(())
    }

    /// Resolve the principal behind an access token.
    pub async fn principal(&self, access_token: &str) -> Result<Principal, AuthError> {
        self.tokens.verify_access(access_token).await
    }

    /// Create an account. The first account ever created becomes superuser.
    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<User, AuthError> {
        let username = username.trim();
        validate_username(username)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let email = email
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .map(|e| validate_email(&e).map(|_| e))
            .transpose()?;

        let (email_ciphertext, email_index) = match &email {
            Some(e) => (
                Some(encrypt(e, &self.config.encryption_key)?),
                Some(blind_index(e, &self.config.encryption_key)),
            ),
            None => (None, None),
        };

        let (user, superuser) = self
            .store
            .create_user(
                NewUser {
                    username: username.to_string(),
                    email_ciphertext,
                    email_index,
                    password_hash: hash_password(password)?,
                },
                Some(SUPER_ROLE),
            )
            .await?;
        info!(user_id = %user.id, superuser, "user registered");

        if let Some(email) = email {
            let token = self.tokens.issue_email_verification(user.id)?;
            self.notify_registration(user.username.clone(), email, token);
        }
        Ok(user)
    }

    fn notify_registration(&self, username: String, email: String, token: String) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_verification(&username, &email, &token).await {
                warn!(%username, error = %e, "verification email not delivered");
            }
            if let Err(e) = notifier.send_welcome(&username, &email).await {
                warn!(%username, error = %e, "welcome email not delivered");
            }
        });
    }

    /// Mark the email address behind a verification token as confirmed.
    pub async fn confirm_email(&self, token: &str) -> Result<Uuid, AuthError> {
        let user_id = self.tokens.verify_email_verification(token)?;
        if !self.store.mark_email_verified(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(%user_id, "email verified");
        Ok(user_id)
    }

    /// Account details for the owner, with the email decrypted.
    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let email = user
            .email_ciphertext
            .as_deref()
            .map(|c| decrypt(c, &self.config.encryption_key))
            .transpose()?;
        Ok(UserProfile {
            id: user.id,
            username: user.username.clone(),
            email,
            mfa_state: user.mfa_state(),
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
        })
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "username must be {MIN_USERNAME_LEN} to {MAX_USERNAME_LEN} characters"
        )));
    }
    // `@` is reserved so a login identifier is unambiguously an email or a username.
    if username.chars().any(|c| c == ':' || c == '@' || c.is_whitespace()) {
        return Err(AuthError::Validation(
            "username must not contain ':', '@' or whitespace".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AuthError::Validation("invalid email address".into())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use totp_rs::{Algorithm, Secret, TOTP};

    use super::*;
    use crate::models::auth::MfaState;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;

    fn engine() -> (Arc<MemoryStore>, Authenticator) {
        let store = Arc::new(MemoryStore::new());
        let config = AuthConfig::new("access-secret", "refresh-secret", "enc-key");
        let auth = Authenticator::new(store.clone(), config, Arc::new(LogNotifier));
        (store, auth)
    }

    fn code_for(secret: &str) -> String {
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "t".into())
            .unwrap()
            .generate_current()
            .unwrap()
    }

    async fn login(auth: &Authenticator, id: &str, pw: &str, code: Option<&str>) -> LoginOutcome {
        auth.login(id, pw, code, &ClientInfo::default()).await.unwrap()
    }

    #[tokio::test]
    async fn register_login_refresh_logout() {
        let (store, auth) = engine();
        let user = auth
            .register("alice", Some("Alice@Example.com"), "correct horse")
            .await
            .unwrap();

        let LoginOutcome::Authenticated(pair) =
            login(&auth, "alice@example.com", "correct horse", None).await
        else {
            panic!("expected tokens");
        };
        let principal = auth.principal(&pair.access_token).await.unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(store.all_sessions().await.len(), 1);

        let access = auth
            .refresh(&pair.refresh_token, &ClientInfo::default())
            .await
            .unwrap();
        auth.principal(&access.token).await.unwrap();

        auth.logout(&principal, &pair.access_token).await.unwrap();
        let err = auth.principal(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenBlacklisted));
        assert!(store.all_sessions().await.is_empty());
        let err = auth
            .refresh(&pair.refresh_token, &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn logout_with_refreshed_access_token_ends_the_session() {
        let (store, auth) = engine();
        auth.register("alice", None, "password1").await.unwrap();
        let LoginOutcome::Authenticated(pair) = login(&auth, "alice", "password1", None).await
        else {
            panic!("expected tokens");
        };
        let access = auth
            .refresh(&pair.refresh_token, &ClientInfo::default())
            .await
            .unwrap();

        let principal = auth.principal(&access.token).await.unwrap();
        auth.logout(&principal, &access.token).await.unwrap();
        assert!(store.all_sessions().await.is_empty());
        let err = auth
            .refresh(&pair.refresh_token, &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn first_user_is_superuser() {
        let (_store, auth) = engine();
        let root = auth.register("root", None, "password1").await.unwrap();
        let other = auth.register("other", None, "password2").await.unwrap();
        assert!(
            auth.permissions()
                .check_permission(root.id, "admin:anything")
                .await
                .unwrap()
        );
        assert!(
            !auth
                .permissions()
                .check_permission(other.id, "read:anything")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn duplicate_username_or_email() {
        let (_store, auth) = engine();
        auth.register("alice", Some("a@example.com"), "password1")
            .await
            .unwrap();
        let err = auth.register("alice", None, "password1").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser));
        let err = auth
            .register("alicia", Some("A@Example.com"), "password1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUser));
    }

    #[tokio::test]
    async fn registration_validation() {
        let (_store, auth) = engine();
        for (name, email, pw) in [
            ("al", None, "password1"),
            ("has space", None, "password1"),
            ("a:b", None, "password1"),
            ("alice@example.com", None, "password1"),
            ("alice", None, "short"),
            ("alice", Some("not-an-email"), "password1"),
        ] {
            let err = auth.register(name, email, pw).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn mfa_login_requires_code_and_creates_no_session() {
        let (store, auth) = engine();
        let user = auth.register("alice", None, "password1").await.unwrap();
        let ticket = auth.mfa().begin_enrollment(user.id).await.unwrap();
        auth.mfa()
            .confirm_enrollment(user.id, &code_for(&ticket.secret))
            .await
            .unwrap();

        let outcome = login(&auth, "alice", "password1", None).await;
        assert!(matches!(outcome, LoginOutcome::MfaRequired));
        assert!(store.all_sessions().await.is_empty());

        let err = auth
            .login("alice", "password1", Some("000000x"), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidMfaToken));
        assert!(store.all_sessions().await.is_empty());

        let code = code_for(&ticket.secret);
        let outcome = login(&auth, "alice", "password1", Some(&code)).await;
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(store.all_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn pending_mfa_does_not_gate_login() {
        let (_store, auth) = engine();
        let user = auth.register("alice", None, "password1").await.unwrap();
        auth.mfa().begin_enrollment(user.id).await.unwrap();
        let outcome = login(&auth, "alice", "password1", None).await;
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn session_cap_holds_across_logins() {
        let (store, auth) = engine();
        let user = auth.register("alice", None, "password1").await.unwrap();
        for _ in 0..7 {
            login(&auth, "alice", "password1", None).await;
        }
        let live = store
            .all_sessions()
            .await
            .into_iter()
            .filter(|s| s.user_id == user.id && !s.is_expired(Utc::now()))
            .count();
        assert_eq!(live, 5);
    }

    #[tokio::test]
    async fn confirm_email_marks_profile_verified() {
        let (_store, auth) = engine();
        let user = auth
            .register("alice", Some("alice@example.com"), "password1")
            .await
            .unwrap();
        let token = auth.tokens().issue_email_verification(user.id).unwrap();

        assert!(!auth.profile(user.id).await.unwrap().is_email_verified);
        assert_eq!(auth.confirm_email(&token).await.unwrap(), user.id);

        let profile = auth.profile(user.id).await.unwrap();
        assert!(profile.is_email_verified);
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
        assert_eq!(profile.mfa_state, MfaState::Disabled);
    }

    #[tokio::test]
    async fn logout_ends_only_its_own_session() {
        let (store, auth) = engine();
        auth.register("alice", None, "password1").await.unwrap();
        let LoginOutcome::Authenticated(laptop) = login(&auth, "alice", "password1", None).await
        else {
            panic!("expected tokens");
        };
        let LoginOutcome::Authenticated(phone) = login(&auth, "alice", "password1", None).await
        else {
            panic!("expected tokens");
        };

        let principal = auth.principal(&laptop.access_token).await.unwrap();
        auth.logout(&principal, &laptop.access_token).await.unwrap();
        assert_eq!(store.all_sessions().await.len(), 1);
        auth.refresh(&phone.refresh_token, &ClientInfo::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn logout_after_eviction_still_blacklists() {
        let (store, auth) = engine();
        auth.register("alice", None, "password1").await.unwrap();
        let LoginOutcome::Authenticated(pair) = login(&auth, "alice", "password1", None).await
        else {
            panic!("expected tokens");
        };
        let principal = auth.principal(&pair.access_token).await.unwrap();
        auth.sessions().revoke_all(principal.user_id).await.unwrap();

        auth.logout(&principal, &pair.access_token).await.unwrap();
        assert_eq!(store.blacklist_len().await, 1);
    }

    #[tokio::test]
    async fn email_login_is_not_shadowed_by_usernames() {
        let (_store, auth) = engine();
        let err = auth
            .register("alice@example.com", None, "password0")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let alice = auth
            .register("alice", Some("alice@example.com"), "password1")
            .await
            .unwrap();
        auth.register("example.com", None, "password2").await.unwrap();

        let LoginOutcome::Authenticated(pair) =
            login(&auth, "alice@example.com", "password1", None).await
        else {
            panic!("expected tokens");
        };
        let principal = auth.principal(&pair.access_token).await.unwrap();
        assert_eq!(principal.user_id, alice.id);
    }

    #[tokio::test]
    async fn mfa_secret_is_sealed_in_store() {
        let (store, auth) = engine();
        let user = auth.register("alice", None, "password1").await.unwrap();
        let ticket = auth.mfa().begin_enrollment(user.id).await.unwrap();
        let stored = store.get_user(user.id).await.unwrap().unwrap().mfa_secret;
        assert_ne!(stored.as_deref(), Some(ticket.secret.as_str()));
    }
}
