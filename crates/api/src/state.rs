use std::sync::Arc;

use wayfarer_engine::{EngineConfig, EstimateCache, GenerationBackend, JobStore};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The Job Record Store (Postgres in production, in-memory otherwise).
    pub store: Arc<dyn JobStore>,
    /// The generation backend entry point.
    pub backend: Arc<dyn GenerationBackend>,
    /// Protocol timing configuration, shared by every submission.
    pub engine: Arc<EngineConfig>,
    /// Process-wide estimate cache (per-requester caching would defeat
    /// the debounce).
    pub estimates: Arc<EstimateCache>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn GenerationBackend>,
        engine: EngineConfig,
        config: ServerConfig,
    ) -> Self {
        let estimates = Arc::new(EstimateCache::new(
            Arc::clone(&backend),
            engine.estimate_ttl,
        ));
        Self {
            store,
            backend,
            engine: Arc::new(engine),
            estimates,
            config: Arc::new(config),
        }
    }
}
