//! Sentinel API server binary.
//!
//! Connects to PostgreSQL, runs migrations, starts the background sweep of
//! expired sessions and blacklist rows, and serves the HTTP API until
//! Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sentinel_api::config::{ApiConfig, parse_api_keys};
use sentinel_core::Authenticator;
use sentinel_core::config::AuthConfig;
use sentinel_core::maintenance;
use sentinel_core::notify::LogNotifier;
use sentinel_core::store::PgAuthStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "sentinel_server", about = "Sentinel authentication server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/sentinel"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Comma-separated keys accepted by `/internal/introspect`.
    #[arg(long, env = "INTROSPECTION_API_KEYS", default_value = "")]
    introspection_api_keys: String,

    /// Take client addresses from `X-Forwarded-For`. Enable only behind a
    /// proxy that overwrites the header.
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = false)]
    trust_forwarded_for: bool,

    /// Seconds between sweeps of expired sessions and blacklist rows.
    #[arg(long, env = "MAINTENANCE_INTERVAL_SECS", default_value_t = 3600)]
    maintenance_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,sentinel_api=debug,sentinel_core=debug"
                    .parse()
                    .unwrap()
            }),
        )
        .init();

    let args = Args::parse();

    let auth_config = AuthConfig::from_env()?;
    auth_config.validate()?;
    info!(?auth_config, "loaded auth configuration");

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    sentinel_api::migrate(&pool).await?;

    let config = ApiConfig {
        bind_addr: args.bind_addr,
        database_url: args.database_url,
        introspection_api_keys: parse_api_keys(&args.introspection_api_keys),
        trust_forwarded_for: args.trust_forwarded_for,
        auth: auth_config.clone(),
    };
    if config.introspection_api_keys.is_empty() {
        info!("no introspection API keys configured; /internal/introspect will refuse all calls");
    }

    let auth = Arc::new(Authenticator::new(
        Arc::new(PgAuthStore::new(pool)),
        auth_config,
        Arc::new(LogNotifier),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = maintenance::spawn(
        auth.tokens().clone(),
        auth.sessions().clone(),
        std::time::Duration::from_secs(args.maintenance_interval_secs.max(1)),
        shutdown.clone(),
    );

    let state = sentinel_api::AppState {
        auth,
        config: config.clone(),
    };
    let app = sentinel_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let api_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    })
    .await;

    // Stop the sweep even if the server exited on its own.
    shutdown.cancel();
    let _ = sweeper.await;

    api_result?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
