//! # sentinel_core
//!
//! Authentication and authorization engine for Sentinel: credential
//! verification, TOTP enrollment, token lifecycle, bounded sessions and
//! RBAC permission resolution over a pluggable `AuthStore`.

pub mod auth;
pub mod config;
pub mod maintenance;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod rbac;
pub mod store;
pub mod uuid;

pub use auth::AuthError;
pub use auth::flow::Authenticator;
pub use config::AuthConfig;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
