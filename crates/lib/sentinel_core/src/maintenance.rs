//! Periodic purge of expired sessions and blacklist rows.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::sessions::SessionStore;
use crate::auth::tokens::TokenLifecycleManager;

/// Default sweep interval: one hour.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run one sweep. Failures are logged and the other half still runs.
pub async fn run_once(tokens: &TokenLifecycleManager, sessions: &SessionStore) {
    match sessions.cleanup_expired().await {
        Ok(removed) => info!(removed, "expired sessions purged"),
        Err(e) => warn!(error = %e, "session cleanup failed"),
    }
    match tokens.prune_blacklist().await {
        Ok(removed) => info!(removed, "expired blacklist entries pruned"),
        Err(e) => warn!(error = %e, "blacklist prune failed"),
    }
}

/// Spawn the sweep on a fixed interval until `cancel` fires. The first
/// sweep runs immediately.
pub fn spawn(
    tokens: Arc<TokenLifecycleManager>,
    sessions: Arc<SessionStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("maintenance task stopped");
                    break;
                }
                _ = ticker.tick() => run_once(&tokens, &sessions).await,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::config::AuthConfig;
    use crate::models::auth::{ClientInfo, NewUser};
    use crate::store::{AuthStore, MemoryStore};
    use crate::uuid::uuidv7;

    #[tokio::test]
    async fn sweep_runs_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let (user, _) = store
            .create_user(
                NewUser {
                    username: "alice".into(),
                    email_ciphertext: None,
                    email_index: None,
                    password_hash: "x".into(),
                },
                None,
            )
            .await
            .unwrap();
        let config = Arc::new(AuthConfig::new("a", "r", "k"));
        let tokens = Arc::new(TokenLifecycleManager::new(store.clone(), config));
        let sessions = Arc::new(SessionStore::new(store.clone(), 5));

        let session = sessions
            .create_session(
                uuidv7(),
                user.id,
                "t1",
                Utc::now() + ChronoDuration::hours(1),
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        store
            .set_session_expiry(session.id, Utc::now() - ChronoDuration::seconds(1))
            .await;
        store
            .insert_blacklisted("gone", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn(tokens, sessions, Duration::from_secs(3600), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.all_sessions().await.is_empty());
        assert_eq!(store.blacklist_len().await, 0);
    }
}
