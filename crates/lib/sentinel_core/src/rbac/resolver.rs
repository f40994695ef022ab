//! Allow/deny decisions for a user and a required permission.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::GrantCache;
use super::permission::Permission;
use crate::auth::AuthError;
use crate::models::rbac::{SUPER_PERMISSION, SUPER_ROLE, UserGrants};
use crate::store::AuthStore;

/// Resolves permissions from direct grants, role grants and the superuser
/// role. The model is additive: nothing denies.
pub struct PermissionResolver {
    store: Arc<dyn AuthStore>,
    cache: Option<GrantCache>,
}

impl PermissionResolver {
    /// Resolver that reads grants from the store on every check.
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store, cache: None }
    }

    /// Resolver that keeps grants for `ttl_ms`. A TTL of zero or less
    /// disables the cache.
    pub fn with_cache(store: Arc<dyn AuthStore>, ttl_ms: i64) -> Self {
        Self {
            store,
            cache: (ttl_ms > 0).then(|| GrantCache::new(ttl_ms)),
        }
    }

    /// Forget cached grants for `user_id` after its roles or permissions
    /// change.
    pub fn invalidate(&self, user_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache.invalidate(user_id);
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Whether `user_id` may act as `required` (`type:resource`).
    pub async fn check_permission(&self, user_id: Uuid, required: &str) -> Result<bool, AuthError> {
        let required: Permission = required
            .parse()
            .map_err(|e| AuthError::Validation(format!("{e}")))?;
        self.check(user_id, &required).await
    }

    /// `check_permission` for an already parsed permission.
    pub async fn check(&self, user_id: Uuid, required: &Permission) -> Result<bool, AuthError> {
        let grants = self.grants(user_id).await?;

        if grants.roles.iter().any(|r| r == SUPER_ROLE)
            || grants.permissions.iter().any(|p| p == SUPER_PERMISSION)
        {
            return Ok(true);
        }

        let allowed = grants.permissions.iter().any(|name| match name.parse::<Permission>() {
            Ok(held) => held.satisfies(required),
            Err(e) => {
                warn!(%user_id, permission = %name, error = %e, "skipping malformed permission");
                false
            }
        });
        debug!(%user_id, required = %required, allowed, "permission check");
        Ok(allowed)
    }

    /// Like `check_permission`, but a denial is `PermissionDenied`.
    pub async fn require(&self, user_id: Uuid, required: &str) -> Result<(), AuthError> {
        if self.check_permission(user_id, required).await? {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied)
        }
    }

    async fn grants(&self, user_id: Uuid) -> Result<UserGrants, AuthError> {
        if let Some(cache) = &self.cache
            && let Some(grants) = cache.get(user_id)
        {
            return Ok(grants);
        }
        let grants = self.store.user_grants(user_id).await?;
        if let Some(cache) = &self.cache {
            cache.insert(user_id, grants.clone());
        }
        Ok(grants)
    }
}
