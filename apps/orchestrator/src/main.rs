mod breaker;
mod clock;
mod config;
mod db;
mod errors;
mod models;
mod orchestrator;
mod providers;
mod registry;
mod routes;
mod selector;
mod state;
mod store;
mod task;
mod tracker;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::breaker::CircuitBreakerManager;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::create_pool;
use crate::orchestrator::Orchestrator;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::openai::OpenAiProvider;
use crate::providers::ProviderRouter;
use crate::registry::{ModelRegistry, Provider};
use crate::routes::build_router;
use crate::selector::ModelSelector;
use crate::state::AppState;
use crate::store::{InMemoryStore, OrchestrationStore, PgStore};
use crate::tracker::PerformanceTracker;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LLM orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Persistence: Postgres when configured, otherwise process-local state
    let store: Arc<dyn OrchestrationStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set; breaker state and metrics will not survive a restart");
            Arc::new(InMemoryStore::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Model catalog + selection strategy
    let registry = Arc::new(ModelRegistry::builtin());
    let strategies = config.load_strategy_table()?;
    let selector = Arc::new(
        ModelSelector::new(
            registry.clone(),
            strategies,
            &config.active_strategy,
            config.budgets.clone(),
        )
        .context("Invalid model selection strategy")?,
    );
    info!("Model selector ready (strategy: {})", config.active_strategy);

    // Provider adapters: only vendors with a key are registered
    let mut router = ProviderRouter::new(registry.clone());
    if let Some(key) = &config.anthropic_api_key {
        router = router.register(
            Provider::Anthropic,
            Arc::new(AnthropicProvider::new(key.clone(), config.request_timeout)?),
        );
    }
    if let Some(key) = &config.openai_api_key {
        router = router.register(
            Provider::OpenAi,
            Arc::new(OpenAiProvider::new(key.clone(), config.request_timeout)?),
        );
    }
    if router.registered().is_empty() {
        warn!("No provider API keys configured; every task will fail as unavailable");
    } else {
        info!("LLM providers registered: {:?}", router.registered());
    }

    let breakers = Arc::new(CircuitBreakerManager::new(
        store.clone(),
        clock.clone(),
        config.breaker,
    ));
    let tracker = Arc::new(PerformanceTracker::new(
        store,
        clock,
        config.budgets.clone(),
    ));

    // The adapters' own timeout is a backstop; this one produces the failure record.
    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        selector,
        breakers.clone(),
        tracker.clone(),
        Arc::new(router),
        config.request_timeout,
    ));

    spawn_retention_sweeper(tracker.clone(), config.metrics_retention_days);

    // Build app state
    let state = AppState {
        orchestrator,
        tracker,
        breakers,
        registry,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Deletes old performance metrics once a day. Cost aggregates are kept.
fn spawn_retention_sweeper(tracker: Arc<PerformanceTracker>, days_to_keep: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = tracker.cleanup_old_metrics(days_to_keep).await {
                error!("Metric retention sweep failed: {e}");
            }
        }
    });
}
