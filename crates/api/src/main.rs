use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfarer_api::config::ServerConfig;
use wayfarer_api::router::build_app_router;
use wayfarer_api::state::AppState;
use wayfarer_engine::backend::http::HttpGenerationBackend;
use wayfarer_engine::store::memory::MemoryJobStore;
use wayfarer_engine::{EngineConfig, JobStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayfarer_api=debug,wayfarer_engine=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let engine = EngineConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Job Record Store ---
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            let pool = wayfarer_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            wayfarer_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            wayfarer_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Postgres job store ready");
            wayfarer_db::store::PgJobStore::start(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory job store");
            Arc::new(MemoryJobStore::new())
        }
    };

    // --- Generation backend ---
    let backend = Arc::new(HttpGenerationBackend::new(config.backend_url.clone()));
    tracing::info!(backend_url = %config.backend_url, "Generation backend configured");

    // --- Router ---
    let state = AppState::new(store, backend, engine, config.clone());
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST and PORT must form a valid socket address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, "Wayfarer API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
