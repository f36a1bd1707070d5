use std::sync::Arc;

use crate::breaker::CircuitBreakerManager;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::registry::ModelRegistry;
use crate::tracker::PerformanceTracker;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub tracker: Arc<PerformanceTracker>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub registry: Arc<ModelRegistry>,
    pub config: Config,
}
