//! Username/email + password verification.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::crypto::blind_index;
use super::password::{verify_dummy, verify_password};
use crate::config::AuthConfig;
use crate::models::auth::User;
use crate::store::AuthStore;

/// Checks a login identifier and password against stored users.
///
/// Unknown user, wrong password and disabled account all surface as
/// `InvalidCredentials`, and each path runs one bcrypt verification.
pub struct CredentialVerifier {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// An `identifier` containing `@` is matched against email addresses via
    /// the blind index, anything else against usernames. Usernames cannot
    /// contain `@`, so the two never overlap.
    pub async fn verify(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let identifier = identifier.trim();
        let found = if identifier.contains('@') {
            let index = blind_index(identifier, &self.config.encryption_key);
            self.store.find_user_by_email_index(&index).await?
        } else {
            self.store.find_user_by_username(identifier).await?
        };
        let Some(user) = found else {
            verify_dummy(password);
            debug!("login for unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash)? {
            debug!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if user.is_disabled {
            debug!(user_id = %user.id, "login for disabled user");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::normalize_email;
    use crate::auth::password::hash_password;
    use crate::models::auth::NewUser;
    use crate::store::MemoryStore;

    const KEY: &str = "enc-key";

    async fn setup() -> (Arc<MemoryStore>, CredentialVerifier) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_user(
                NewUser {
                    username: "alice".into(),
                    email_ciphertext: None,
                    email_index: Some(blind_index(&normalize_email("Alice@Example.com"), KEY)),
                    password_hash: hash_password("correct horse").unwrap(),
                },
                None,
            )
            .await
            .unwrap();
        let config = Arc::new(AuthConfig::new("a", "r", KEY));
        (store.clone(), CredentialVerifier::new(store, config))
    }

    #[tokio::test]
    async fn accepts_username_or_email() {
        let (_store, verifier) = setup().await;
        let by_name = verifier.verify("alice", "correct horse").await.unwrap();
        let by_email = verifier
            .verify("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(by_name.id, by_email.id);
    }

    #[tokio::test]
    async fn email_identifier_never_matches_a_username() {
        let (store, verifier) = setup().await;
        // Written straight to the store, bypassing registration checks.
        store
            .create_user(
                NewUser {
                    username: "alice@example.com".into(),
                    email_ciphertext: None,
                    email_index: None,
                    password_hash: hash_password("other pass").unwrap(),
                },
                None,
            )
            .await
            .unwrap();

        let user = verifier
            .verify("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        let err = verifier
            .verify("alice@example.com", "other pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let (_store, verifier) = setup().await;
        let unknown = verifier.verify("bob", "correct horse").await.unwrap_err();
        let wrong = verifier.verify("alice", "battery staple").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn disabled_user_is_rejected() {
        let (store, verifier) = setup().await;
        let user = verifier.verify("alice", "correct horse").await.unwrap();
        store.set_disabled(user.id, true).await;
        let err = verifier.verify("alice", "correct horse").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
