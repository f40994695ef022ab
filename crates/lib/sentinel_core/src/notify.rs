//! Outbound notification sink (verification and welcome mail).
//!
//! Delivery is fire-and-forget: the engine spawns each send and only logs
//! failures.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a link carrying `token` to confirm `email`.
    async fn send_verification(
        &self,
        username: &str,
        email: &str,
        token: &str,
    ) -> Result<(), NotifyError>;

    async fn send_welcome(&self, username: &str, email: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification(
        &self,
        username: &str,
        email: &str,
        _token: &str,
    ) -> Result<(), NotifyError> {
        info!(%username, %email, "verification email queued");
        Ok(())
    }

    async fn send_welcome(&self, username: &str, email: &str) -> Result<(), NotifyError> {
        info!(%username, %email, "welcome email queued");
        Ok(())
    }
}
