//! Short-lived per-user grant cache with TTL-based expiration.
//!
//! Entries are never trusted past their TTL, and callers that change a
//! user's roles or permissions invalidate that user explicitly.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::rbac::UserGrants;

#[derive(Debug, Clone)]
struct CacheEntry {
    grants: UserGrants,
    expires_at: DateTime<Utc>,
}

/// Grants keyed by user id.
#[derive(Debug)]
pub struct GrantCache {
    entries: DashMap<Uuid, CacheEntry>,
    ttl: Duration,
}

impl GrantCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::milliseconds(ttl_ms),
        }
    }

    /// Cached grants if present and unexpired.
    pub fn get(&self, user_id: Uuid) -> Option<UserGrants> {
        let entry = self.entries.get(&user_id)?;
        if Utc::now() < entry.expires_at {
            Some(entry.grants.clone())
        } else {
            drop(entry);
            self.entries.remove(&user_id);
            None
        }
    }

    pub fn insert(&self, user_id: Uuid, grants: UserGrants) {
        let expires_at = Utc::now() + self.ttl;
        self.entries.insert(user_id, CacheEntry { grants, expires_at });
    }

    pub fn invalidate(&self, user_id: Uuid) {
        self.entries.remove(&user_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(perm: &str) -> UserGrants {
        UserGrants {
            roles: vec![],
            permissions: vec![perm.to_string()],
        }
    }

    #[test]
    fn insert_then_get() {
        let cache = GrantCache::new(60_000);
        let user = Uuid::new_v4();
        cache.insert(user, grants("read:orders"));
        assert_eq!(cache.get(user), Some(grants("read:orders")));
        assert!(cache.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn expired_entry_is_dropped() {
        let cache = GrantCache::new(0);
        let user = Uuid::new_v4();
        cache.insert(user, grants("read:orders"));
        assert!(cache.get(user).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = GrantCache::new(60_000);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.insert(a, grants("read:x"));
        cache.insert(b, grants("read:y"));
        cache.invalidate(a);
        assert!(cache.get(a).is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
