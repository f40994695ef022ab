//! Persistence seam for the engine.
//!
//! `AuthStore` is the only way the engine touches users, sessions, grants
//! and the token blacklist. `PgAuthStore` is the production backend;
//! `MemoryStore` backs tests and database-less embedders.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{ClientInfo, NewSession, NewUser, Session, User};
use crate::models::rbac::UserGrants;

pub use memory::MemoryStore;
pub use postgres::PgAuthStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violated; carries the constraint name only.
    #[error("Conflict on {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Backend operations required by the engine.
///
/// Time is passed in explicitly so every backend agrees on "now" with the
/// caller that made the decision.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // -- users --------------------------------------------------------------

    /// Insert a user. When `first_user_role` is set and no other user exists,
    /// the role is granted in the same transaction. Returns the new user and
    /// whether the role was granted.
    async fn create_user(
        &self,
        user: NewUser,
        first_user_role: Option<&str>,
    ) -> StoreResult<(User, bool)>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email_index(&self, email_index: &str) -> StoreResult<Option<User>>;

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Overwrite the MFA columns. Returns false if the user does not exist.
    async fn set_mfa(
        &self,
        user_id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> StoreResult<bool>;

    async fn mark_email_verified(&self, user_id: Uuid) -> StoreResult<bool>;

    // -- sessions -----------------------------------------------------------

    /// Insert under `session.id`.
    async fn insert_session(
        &self,
        session: NewSession,
        now: DateTime<Utc>,
    ) -> StoreResult<Session>;

    /// Delete this user's sessions with `expires_at <= now` or `is_active = false`.
    async fn delete_expired_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn count_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64>;

    /// Delete the session with the oldest `last_used_at`. Returns its id.
    async fn delete_least_recently_used_session(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<Uuid>>;

    /// Set `last_used_at = now`, and the ip/user agent where `client` has them.
    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        client: &ClientInfo,
    ) -> StoreResult<bool>;

    /// Live (unexpired, active) session bearing this token digest.
    async fn find_live_session_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;

    /// Sessions ordered by `last_used_at` descending.
    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<Session>>;

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> StoreResult<bool>;

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64>;

    /// Global sweep across all users.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    // -- blacklist ----------------------------------------------------------

    async fn insert_blacklisted(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn is_blacklisted(&self, token_hash: &str) -> StoreResult<bool>;

    async fn delete_expired_blacklisted(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    // -- rbac ---------------------------------------------------------------

    /// Role names plus the union of direct and role-inherited permission names.
    async fn user_grants(&self, user_id: Uuid) -> StoreResult<UserGrants>;
}
