//! In-process `AuthStore`.
//!
//! Mirrors the PostgreSQL schema closely enough for the engine to behave
//! identically: unique usernames/email indexes/token digests, cascade delete
//! of sessions, and role/permission joins. Grant helpers stand in for the
//! administrative CRUD that lives outside the engine.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::models::auth::{ClientInfo, NewSession, NewUser, Session, User};
use crate::models::rbac::{
    PermissionRecord, Resource, Role, SUPER_PERMISSION, SUPER_ROLE, UserGrants,
};
use crate::uuid::uuidv7;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    /// Insertion order doubles as the LRU tie-break.
    sessions: Vec<Session>,
    blacklist: HashMap<String, DateTime<Utc>>,
    roles: Vec<Role>,
    resources: Vec<Resource>,
    permissions: Vec<PermissionRecord>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    user_roles: HashSet<(Uuid, Uuid)>,
    user_permissions: HashSet<(Uuid, Uuid)>,
}

impl Tables {
    fn role_id(&mut self, name: &str) -> Uuid {
        if let Some(role) = self.roles.iter().find(|r| r.name == name) {
            return role.id;
        }
        let role = Role {
            id: uuidv7(),
            name: name.to_string(),
        };
        let id = role.id;
        self.roles.push(role);
        id
    }

    fn permission_id(&mut self, name: &str) -> Uuid {
        if let Some(perm) = self.permissions.iter().find(|p| p.name == name) {
            return perm.id;
        }
        let (kind, resource) = name.split_once(':').unwrap_or((name, "*"));
        let resource_id = if resource == "*" {
            None
        } else {
            Some(self.resource_id(resource))
        };
        let perm = PermissionRecord {
            id: uuidv7(),
            name: name.to_string(),
            kind: kind.to_string(),
            resource_id,
        };
        let id = perm.id;
        self.permissions.push(perm);
        id
    }

    fn resource_id(&mut self, name: &str) -> Uuid {
        if let Some(res) = self.resources.iter().find(|r| r.name == name) {
            return res.id;
        }
        let res = Resource {
            id: uuidv7(),
            name: name.to_string(),
        };
        let id = res.id;
        self.resources.push(res);
        id
    }
}

/// `AuthStore` held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Empty store seeded with the `super` role holding `*:*`.
    pub fn new() -> Self {
        let mut tables = Tables::default();
        let role = tables.role_id(SUPER_ROLE);
        let perm = tables.permission_id(SUPER_PERMISSION);
        tables.role_permissions.insert((role, perm));
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Grant a role (created on first use) to a user.
    pub async fn grant_role(&self, user_id: Uuid, role: &str) {
        let mut t = self.tables.write().await;
        let role_id = t.role_id(role);
        t.user_roles.insert((user_id, role_id));
    }

    /// Attach a permission (created on first use) to a role.
    pub async fn grant_role_permission(&self, role: &str, permission: &str) {
        let mut t = self.tables.write().await;
        let role_id = t.role_id(role);
        let perm_id = t.permission_id(permission);
        t.role_permissions.insert((role_id, perm_id));
    }

    /// Grant a permission (created on first use) directly to a user.
    pub async fn grant_user_permission(&self, user_id: Uuid, permission: &str) {
        let mut t = self.tables.write().await;
        let perm_id = t.permission_id(permission);
        t.user_permissions.insert((user_id, perm_id));
    }

    /// Flip the disabled flag, as an administrator would.
    pub async fn set_disabled(&self, user_id: Uuid, disabled: bool) {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == user_id) {
            user.is_disabled = disabled;
        }
    }

    /// Every session row, regardless of owner or expiry.
    pub async fn all_sessions(&self) -> Vec<Session> {
        self.tables.read().await.sessions.clone()
    }

    pub async fn blacklist_len(&self) -> usize {
        self.tables.read().await.blacklist.len()
    }

    /// Force a session's expiry, for exercising sweeps.
    pub async fn set_session_expiry(&self, session_id: Uuid, expires_at: DateTime<Utc>) {
        let mut t = self.tables.write().await;
        if let Some(s) = t.sessions.iter_mut().find(|s| s.id == session_id) {
            s.expires_at = expires_at;
        }
    }

    /// Delete a user and cascade to its sessions and grants.
    pub async fn delete_user(&self, user_id: Uuid) {
        let mut t = self.tables.write().await;
        t.users.retain(|u| u.id != user_id);
        t.sessions.retain(|s| s.user_id != user_id);
        t.user_roles.retain(|(u, _)| *u != user_id);
        t.user_permissions.retain(|(u, _)| *u != user_id);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(
        &self,
        user: NewUser,
        first_user_role: Option<&str>,
    ) -> StoreResult<(User, bool)> {
        let mut t = self.tables.write().await;

        if t.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }
        if let Some(index) = &user.email_index
            && t.users.iter().any(|u| u.email_index.as_ref() == Some(index))
        {
            return Err(StoreError::Conflict("users_email_index_key".into()));
        }

        let is_first = t.users.is_empty();
        let created = User {
            id: uuidv7(),
            username: user.username,
            email_ciphertext: user.email_ciphertext,
            email_index: user.email_index,
            password_hash: user.password_hash,
            mfa_enabled: false,
            mfa_secret: None,
            is_disabled: false,
            is_email_verified: false,
            created_at: Utc::now(),
        };
        t.users.push(created.clone());

        let role_id = first_user_role
            .filter(|_| is_first)
            .and_then(|role| t.roles.iter().find(|r| r.name == role).map(|r| r.id));
        let granted = match role_id {
            Some(role_id) => t.user_roles.insert((created.id, role_id)),
            None => false,
        };

        Ok((created, granted))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email_index(&self, email_index: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users
            .iter()
            .find(|u| u.email_index.as_deref() == Some(email_index))
            .cloned())
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn set_mfa(
        &self,
        user_id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        match t.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.mfa_secret = secret.map(str::to_string);
                user.mfa_enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        match t.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.is_email_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_session(
        &self,
        session: NewSession,
        now: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let mut t = self.tables.write().await;
        if t.sessions.iter().any(|s| s.id == session.id) {
            return Err(StoreError::Conflict("sessions_pkey".into()));
        }
        if t.sessions.iter().any(|s| s.token_hash == session.token_hash) {
            return Err(StoreError::Conflict("sessions_token_hash_key".into()));
        }
        let row = Session {
            id: session.id,
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: now,
            last_used_at: now,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            is_active: true,
        };
        t.sessions.push(row.clone());
        Ok(row)
    }

    async fn delete_expired_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.sessions.len();
        t.sessions
            .retain(|s| s.user_id != user_id || (s.is_active && !s.is_expired(now)));
        Ok((before - t.sessions.len()) as u64)
    }

    async fn count_active_sessions(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64> {
        let t = self.tables.read().await;
        let count = t
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active && !s.is_expired(now))
            .count();
        Ok(count as i64)
    }

    async fn delete_least_recently_used_session(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<Uuid>> {
        let mut t = self.tables.write().await;
        // min_by_key keeps the first minimum, i.e. the earliest inserted on ties.
        let oldest = t
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.user_id == user_id)
            .min_by_key(|(_, s)| (s.last_used_at, s.created_at))
            .map(|(i, _)| i);
        Ok(oldest.map(|i| t.sessions.remove(i).id))
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        client: &ClientInfo,
    ) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        match t.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(s) => {
                s.last_used_at = now;
                if client.ip_address.is_some() {
                    s.ip_address = client.ip_address.clone();
                }
                if client.user_agent.is_some() {
                    s.user_agent = client.user_agent.clone();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_live_session_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let t = self.tables.read().await;
        Ok(t.sessions
            .iter()
            .find(|s| s.token_hash == token_hash && s.is_active && !s.is_expired(now))
            .cloned())
    }

    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<Session>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Session> = t
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        let before = t.sessions.len();
        t.sessions
            .retain(|s| !(s.id == session_id && s.user_id == user_id));
        Ok(t.sessions.len() < before)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.sessions.len();
        t.sessions.retain(|s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.sessions.len();
        t.sessions.retain(|s| s.is_active && !s.is_expired(now));
        Ok((before - t.sessions.len()) as u64)
    }

    async fn insert_blacklisted(
        &self,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.blacklist
            .entry(token_hash.to_string())
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_blacklisted(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.blacklist.contains_key(token_hash))
    }

    async fn delete_expired_blacklisted(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.blacklist.len();
        t.blacklist.retain(|_, expires_at| *expires_at > now);
        Ok((before - t.blacklist.len()) as u64)
    }

    async fn user_grants(&self, user_id: Uuid) -> StoreResult<UserGrants> {
        let t = self.tables.read().await;

        let role_ids: HashSet<Uuid> = t
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect();

        let roles = t
            .roles
            .iter()
            .filter(|r| role_ids.contains(&r.id))
            .map(|r| r.name.clone())
            .collect();

        let perm_ids: HashSet<Uuid> = t
            .user_permissions
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, p)| *p)
            .chain(
                t.role_permissions
                    .iter()
                    .filter(|(r, _)| role_ids.contains(r))
                    .map(|(_, p)| *p),
            )
            .collect();

        let permissions = t
            .permissions
            .iter()
            .filter(|p| perm_ids.contains(&p.id))
            .map(|p| p.name.clone())
            .collect();

        Ok(UserGrants { roles, permissions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email_ciphertext: None,
            email_index: Some(format!("idx-{name}")),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice"), None).await.unwrap();
        let err = store.create_user(new_user("alice"), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_username_key"));
    }

    #[tokio::test]
    async fn first_user_receives_role_only_once() {
        let store = MemoryStore::new();
        let (a, granted_a) = store
            .create_user(new_user("alice"), Some(SUPER_ROLE))
            .await
            .unwrap();
        let (b, granted_b) = store
            .create_user(new_user("bob"), Some(SUPER_ROLE))
            .await
            .unwrap();
        assert!(granted_a);
        assert!(!granted_b);
        assert_eq!(store.user_grants(a.id).await.unwrap().roles, vec!["super"]);
        assert!(store.user_grants(b.id).await.unwrap().roles.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_grant_first_user_role_once() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create_user(new_user(&format!("user{i}")), Some(SUPER_ROLE))
                        .await
                        .unwrap()
                        .1
                })
            })
            .collect();
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn grants_union_direct_and_role_permissions() {
        let store = MemoryStore::new();
        let (user, _) = store.create_user(new_user("alice"), None).await.unwrap();
        store.grant_role(user.id, "clerk").await;
        store.grant_role_permission("clerk", "read:orders").await;
        store.grant_user_permission(user.id, "write:invoices").await;
        store.grant_user_permission(user.id, "read:orders").await;

        let mut grants = store.user_grants(user.id).await.unwrap();
        grants.permissions.sort();
        assert_eq!(grants.roles, vec!["clerk"]);
        assert_eq!(grants.permissions, vec!["read:orders", "write:invoices"]);
    }

    #[tokio::test]
    async fn delete_user_cascades_sessions() {
        let store = MemoryStore::new();
        let (user, _) = store.create_user(new_user("alice"), None).await.unwrap();
        let now = Utc::now();
        store
            .insert_session(
                NewSession {
                    id: uuidv7(),
                    user_id: user.id,
                    token_hash: "t1".into(),
                    expires_at: now + chrono::Duration::hours(1),
                    ip_address: None,
                    user_agent: None,
                },
                now,
            )
            .await
            .unwrap();
        store.delete_user(user.id).await;
        assert!(store.all_sessions().await.is_empty());
    }
}
