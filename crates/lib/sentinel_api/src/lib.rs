//! # sentinel_api
//!
//! HTTP API library for Sentinel.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sentinel_core::Authenticator;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, health, introspect, mfa, permissions, sessions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
///
/// Delegates to `sentinel_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sentinel_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_VERIFY_EMAIL, post(auth::verify_email_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Protected routes (require bearer auth)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::POST_AUTH_MFA_ENROLL, post(mfa::enroll_handler))
        .route(routes::POST_AUTH_MFA_CONFIRM, post(mfa::confirm_handler))
        .route(routes::POST_AUTH_MFA_DISABLE, post(mfa::disable_handler))
        .route(
            routes::AUTH_SESSIONS,
            get(sessions::list_sessions_handler).delete(sessions::revoke_all_sessions_handler),
        )
        .route(
            routes::DELETE_AUTH_SESSIONS_ID,
            axum::routing::delete(sessions::revoke_session_handler),
        )
        .route(
            routes::GET_AUTH_PERMISSIONS_CHECK,
            get(permissions::check_permission_handler),
        )
        .route(
            routes::ADMIN_USERS_ID_SESSIONS,
            get(admin::list_user_sessions_handler).delete(admin::revoke_user_sessions_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Backend-to-backend routes (require API key)
    let internal = Router::new()
        .route(
            routes::POST_INTERNAL_INTROSPECT,
            post(introspect::introspect_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(internal)
        .layer(cors)
        .with_state(state)
}
