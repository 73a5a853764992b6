mod auth;
mod config;
mod db;
mod error;
mod extractors;
mod handlers;
mod middleware;
mod models;
mod openapi;
mod services;
mod startup;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use auth::SessionStore;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use handlers::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub sessions: SessionStore,
    pub config: AppConfig,
    pub metrics: Arc<MetricsState>,
}

/// Text logs for development; `LOG_FORMAT=json` for structured production logs.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hms_axum=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before reading LOG_FORMAT / RUST_LOG
    dotenvy::dotenv().ok();

    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        e
    })?;

    let db = db::create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("Failed to create database pool: {}", e);
        e
    })?;

    db::run_migrations(&db).await.map_err(|e| {
        tracing::error!("Failed to apply migrations: {}", e);
        e
    })?;

    tracing::info!("Database ready");

    let metrics_state = Arc::new(handlers::setup_metrics_recorder()?);
    tracing::info!("Metrics recorder initialized");

    let sessions = SessionStore::new(config.session_idle_timeout);
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState {
        db,
        sessions,
        config,
        metrics: metrics_state,
    });

    let app = startup::build_router(state)?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
