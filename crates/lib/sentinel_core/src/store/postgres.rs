//! PostgreSQL-backed `AuthStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::models::auth::{ClientInfo, NewSession, NewUser, Session, User};
use crate::models::rbac::UserGrants;
use crate::uuid::uuidv7;

const USER_COLUMNS: &str = "id, username, email_ciphertext, email_index, password_hash, \
     mfa_enabled, mfa_secret, is_disabled, is_email_verified, created_at";

const SESSION_COLUMNS: &str = "id, user_id, token_hash, expires_at, created_at, last_used_at, \
     ip_address, user_agent, is_active";

/// Advisory lock key serializing registrations that may claim the
/// first-user role.
const FIRST_USER_LOCK_KEY: i64 = 0x5e47_1e11;

/// Translate unique violations into `StoreError::Conflict`.
fn map_conflict(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
    }
    StoreError::Db(e)
}

/// `AuthStore` over a `PgPool`.
#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn create_user(
        &self,
        user: NewUser,
        first_user_role: Option<&str>,
    ) -> StoreResult<(User, bool)> {
        let mut tx = self.pool.begin().await?;

        let is_first = match first_user_role {
            Some(_) => {
                // Held until commit, so racing registrations see each other's rows.
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(FIRST_USER_LOCK_KEY)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query_scalar::<_, bool>("SELECT NOT EXISTS(SELECT 1 FROM users)")
                    .fetch_one(&mut *tx)
                    .await?
            }
            None => false,
        };

        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email_ciphertext, email_index, password_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(uuidv7())
        .bind(&user.username)
        .bind(&user.email_ciphertext)
        .bind(&user.email_index)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_conflict)?;

        let mut granted = false;
        if let Some(role) = first_user_role
            && is_first
        {
            let result = sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, id FROM roles WHERE name = $2",
            )
            .bind(created.id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
            granted = result.rows_affected() > 0;
        }

        tx.commit().await?;
        Ok((created, granted))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user_by_email_index(&self, email_index: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email_index = $1"
        ))
        .bind(email_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_mfa(
        &self,
        user_id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE users SET mfa_secret = $2, mfa_enabled = $3 WHERE id = $1")
                .bind(user_id)
                .bind(secret)
                .bind(enabled)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET is_email_verified = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(
        &self,
        session: NewSession,
        now: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions \
             (id, user_id, token_hash, expires_at, created_at, last_used_at, \
              ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $5, $6, $7) \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(now)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(map_conflict)?;
        Ok(row)
    }

    async fn delete_expired_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sessions \
             WHERE user_id = $1 AND (expires_at <= $2 OR NOT is_active)",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions \
             WHERE user_id = $1 AND is_active AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_least_recently_used_session(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM sessions WHERE id = ( \
                 SELECT id FROM sessions WHERE user_id = $1 \
                 ORDER BY last_used_at ASC, created_at ASC LIMIT 1 \
             ) RETURNING id",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        client: &ClientInfo,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_used_at = $2, \
                 ip_address = COALESCE($3, ip_address), \
                 user_agent = COALESCE($4, user_agent) \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(now)
        .bind(&client.ip_address)
        .bind(&client.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_live_session_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE token_hash = $1 AND is_active AND expires_at > $2"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 \
             ORDER BY last_used_at DESC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1 OR NOT is_active")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_blacklisted(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO blacklisted_tokens (token_hash, expires_at) VALUES ($1, $2) \
             ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_blacklisted(&self, token_hash: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM blacklisted_tokens WHERE token_hash = $1)",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn delete_expired_blacklisted(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn user_grants(&self, user_id: Uuid) -> StoreResult<UserGrants> {
        let roles = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let permissions = sqlx::query_scalar::<_, String>(
            "SELECT p.name FROM user_permissions up \
             JOIN permissions p ON p.id = up.permission_id \
             WHERE up.user_id = $1 \
             UNION \
             SELECT p.name FROM user_roles ur \
             JOIN role_permissions rp ON rp.role_id = ur.role_id \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(UserGrants { roles, permissions })
    }
}
