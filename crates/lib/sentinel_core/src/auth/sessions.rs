//! Session bookkeeping with a per-user concurrency cap.
//!
//! `create_session` purges, counts, evicts and inserts as four separate store
//! calls. Two racing logins for a user at the cap can both see room and both
//! insert; the cap is soft and the next login or sweep brings it back down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::crypto::hash_token;
use crate::models::auth::{ClientInfo, NewSession, Session};
use crate::store::AuthStore;

/// Tracks one row per active login.
pub struct SessionStore {
    store: Arc<dyn AuthStore>,
    session_limit: usize,
}

impl SessionStore {
    pub fn new(store: Arc<dyn AuthStore>, session_limit: usize) -> Self {
        Self {
            store,
            session_limit: session_limit.max(1),
        }
    }

    pub fn session_limit(&self) -> usize {
        self.session_limit
    }

    /// Record a login under `session_id`. A user already at the cap loses
    /// the least recently used session; login is never refused for being
    /// over the limit.
    pub async fn create_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let now = Utc::now();

        let purged = self
            .store
            .delete_expired_sessions_for_user(user_id, now)
            .await?;
        if purged > 0 {
            debug!(%user_id, purged, "purged expired sessions before login");
        }

        let active = self.store.count_active_sessions(user_id, now).await?;
        if active >= self.limit_i64() {
            if let Some(evicted) = self
                .store
                .delete_least_recently_used_session(user_id)
                .await?
            {
                info!(%user_id, session_id = %evicted, "session limit reached, evicted oldest session");
            }
        }

        let session = self
            .store
            .insert_session(
                NewSession {
                    id: session_id,
                    user_id,
                    token_hash: hash_token(refresh_token),
                    expires_at,
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                },
                now,
            )
            .await?;
        Ok(session)
    }

    /// Mark a session as used now, recording whichever client details the
    /// caller knows.
    pub async fn touch(&self, session_id: Uuid, client: &ClientInfo) -> Result<(), AuthError> {
        if !self
            .store
            .touch_session(session_id, Utc::now(), client)
            .await?
        {
            return Err(AuthError::SessionNotFound);
        }
        Ok(())
    }

    /// Live sessions, most recently used first, at most `session_limit`.
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        self.store
            .delete_expired_sessions_for_user(user_id, Utc::now())
            .await?;
        Ok(self.store.list_sessions(user_id, self.limit_i64()).await?)
    }

    /// Log out one device. Only the owner's sessions match.
    pub async fn revoke(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AuthError> {
        if !self.store.delete_session(user_id, session_id).await? {
            return Err(AuthError::SessionNotFound);
        }
        info!(%user_id, %session_id, "session revoked");
        Ok(())
    }

    /// Log out everywhere.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let removed = self.store.delete_user_sessions(user_id).await?;
        info!(%user_id, removed, "all sessions revoked");
        Ok(removed)
    }

    /// Global sweep of expired and inactive sessions.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.delete_expired_sessions(Utc::now()).await?)
    }

    fn limit_i64(&self) -> i64 {
        i64::try_from(self.session_limit).unwrap_or(i64::MAX)
    }
}
