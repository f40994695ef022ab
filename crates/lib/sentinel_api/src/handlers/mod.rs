//! Request handlers.

pub mod admin;
pub mod auth;
pub mod health;
pub mod introspect;
pub mod mfa;
pub mod permissions;
pub mod sessions;
