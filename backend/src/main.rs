//! WHR Tracking Backend Server
//!
//! Backend for a Miami consolidation warehouse: receives packages, issues
//! warehouse receipts (WHRs), classifies them onto air or sea shipments and
//! exposes public tracking for consignees in Costa Rica.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod repository;
mod routes;
mod services;

pub use crate::config::Config;

use crate::config::StorageBackend;
use crate::error::{AppError, AppResult};
use crate::repository::{InMemoryWhrRepository, PostgresWhrRepository, WhrRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn WhrRepository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whr_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting WHR Tracking Server");
    tracing::info!("Environment: {}", config.environment);

    let repo = build_repository(&config).await?;

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Select and initialize the storage backend from configuration
async fn build_repository(config: &Config) -> AppResult<Arc<dyn WhrRepository>> {
    match config.database.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(InMemoryWhrRepository::new()))
        }
        StorageBackend::Postgres => {
            let url = config.database.url.as_deref().ok_or_else(|| {
                AppError::Configuration(
                    "database.url is required for the postgres backend".to_string(),
                )
            })?;

            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;

            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
                tracing::info!("Migrations completed");
            }

            Ok(Arc::new(PostgresWhrRepository::new(db_pool)))
        }
    }
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "WHR Tracking API v1.0"
}
