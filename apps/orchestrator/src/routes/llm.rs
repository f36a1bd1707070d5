use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breaker::state::CircuitBreakerStatus;
use crate::errors::AppError;
use crate::orchestrator::{TaskOutcome, TaskRequest};
use crate::registry::ModelConfig;
use crate::state::AppState;
use crate::task::TaskType;
use crate::tracker::summary::{ModelPerformanceSummary, Priority};
use crate::tracker::BudgetStatus;

const DEFAULT_SUMMARY_DAYS: i64 = 7;
const MAX_SUMMARY_DAYS: i64 = 365;

#[derive(Deserialize)]
pub struct PerformanceQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct BestModelQuery {
    pub task_type: String,
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BestModelResponse {
    pub task_type: TaskType,
    pub priority: Priority,
    /// `None` when no model has successful history for the task.
    pub model: Option<String>,
}

/// POST /api/v1/llm/tasks
pub async fn handle_run_task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskOutcome>, AppError> {
    let outcome = state.orchestrator.execute(req).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/llm/models
pub async fn handle_list_models(State(state): State<AppState>) -> Json<Vec<ModelConfig>> {
    Json(state.registry.list_models().into_iter().cloned().collect())
}

/// GET /api/v1/llm/breakers/:model
pub async fn handle_breaker_status(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<CircuitBreakerStatus>, AppError> {
    if !state.registry.contains(&model) {
        return Err(AppError::NotFound(format!("Unknown model: {model}")));
    }
    Ok(Json(state.breakers.get_breaker_status(&model).await?))
}

/// GET /api/v1/llm/performance?days=
pub async fn handle_performance(
    State(state): State<AppState>,
    Query(params): Query<PerformanceQuery>,
) -> Result<Json<Vec<ModelPerformanceSummary>>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {MAX_SUMMARY_DAYS}"
        )));
    }
    Ok(Json(state.tracker.get_model_performance_summary(days).await?))
}

/// GET /api/v1/llm/budget?user_id=
pub async fn handle_budget(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<BudgetStatus>, AppError> {
    Ok(Json(state.tracker.get_user_budget_status(params.user_id).await?))
}

/// GET /api/v1/llm/best-model?task_type=&priority=
pub async fn handle_best_model(
    State(state): State<AppState>,
    Query(params): Query<BestModelQuery>,
) -> Result<Json<BestModelResponse>, AppError> {
    let task_type: TaskType = params
        .task_type
        .parse()
        .map_err(|e: crate::task::TaskInputError| AppError::Validation(e.to_string()))?;
    let priority: Priority = match params.priority.as_deref() {
        None => Priority::Balanced,
        Some(raw) => raw.parse().map_err(AppError::Validation)?,
    };

    let model = state
        .tracker
        .get_best_model_for_task(task_type, priority)
        .await?;
    Ok(Json(BestModelResponse {
        task_type,
        priority,
        model,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::state::{BreakerSettings, BreakerState};
    use crate::breaker::CircuitBreakerManager;
    use crate::clock::SystemClock;
    use crate::config::{BudgetConfig, Config};
    use crate::orchestrator::{OrchestrationError, Orchestrator};
    use crate::providers::ProviderRouter;
    use crate::registry::ModelRegistry;
    use crate::selector::strategy::StrategyTable;
    use crate::selector::ModelSelector;
    use crate::store::InMemoryStore;
    use crate::tracker::PerformanceTracker;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            database_url: None,
            anthropic_api_key: None,
            openai_api_key: None,
            port: 0,
            rust_log: "debug".into(),
            active_strategy: "balanced".into(),
            strategy_table_path: None,
            budgets: BudgetConfig::default(),
            breaker: BreakerSettings::default(),
            request_timeout: Duration::from_secs(5),
            metrics_retention_days: 90,
        }
    }

    /// Full state over an in-memory store with no providers registered.
    fn test_state() -> AppState {
        let config = test_config();
        let registry = Arc::new(ModelRegistry::builtin());
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(SystemClock);
        let breakers = Arc::new(CircuitBreakerManager::new(
            store.clone(),
            clock.clone(),
            config.breaker,
        ));
        let tracker = Arc::new(PerformanceTracker::new(store, clock, config.budgets.clone()));
        let selector = Arc::new(
            ModelSelector::new(
                registry.clone(),
                StrategyTable::default(),
                &config.active_strategy,
                config.budgets.clone(),
            )
            .unwrap(),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            selector,
            breakers.clone(),
            tracker.clone(),
            Arc::new(ProviderRouter::new(registry.clone())),
            config.request_timeout,
        ));
        AppState {
            orchestrator,
            tracker,
            breakers,
            registry,
            config,
        }
    }

    #[tokio::test]
    async fn test_list_models_in_catalog_order() {
        let Json(models) = handle_list_models(State(test_state())).await;
        assert_eq!(models.first().map(|m| m.name.as_str()), Some("gpt-5"));
        assert_eq!(models.len(), ModelRegistry::builtin().list_models().len());
    }

    #[tokio::test]
    async fn test_breaker_status_for_known_and_unknown_models() {
        let state = test_state();
        let Json(status) = handle_breaker_status(State(state.clone()), Path("gpt-4o".into()))
            .await
            .unwrap();
        assert_eq!(status.state, BreakerState::Closed);

        let err = handle_breaker_status(State(state), Path("gpt-17".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_performance_rejects_out_of_range_days() {
        let err = handle_performance(State(test_state()), Query(PerformanceQuery { days: Some(0) }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let Json(summary) =
            handle_performance(State(test_state()), Query(PerformanceQuery { days: None }))
                .await
                .unwrap();
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_best_model_validates_query() {
        let query = |task_type: &str, priority: Option<&str>| {
            Query(BestModelQuery {
                task_type: task_type.into(),
                priority: priority.map(String::from),
            })
        };

        let err = handle_best_model(State(test_state()), query("summarize", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = handle_best_model(State(test_state()), query("cv_generation", Some("cheap")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let Json(best) = handle_best_model(State(test_state()), query("cv_generation", None))
            .await
            .unwrap();
        assert_eq!(best.priority, Priority::Balanced);
        assert!(best.model.is_none());
    }

    #[tokio::test]
    async fn test_run_task_without_providers_is_unavailable() {
        let request: TaskRequest = serde_json::from_value(serde_json::json!({
            "input": { "task_type": "job_parsing", "job_description": "Rust engineer" }
        }))
        .unwrap();
        let err = handle_run_task(State(test_state()), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Orchestration(OrchestrationError::AllModelsUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_budget_for_new_user_is_untouched() {
        let user_id = Uuid::new_v4();
        let Json(status) = handle_budget(State(test_state()), Query(UserIdQuery { user_id }))
            .await
            .unwrap();
        assert_eq!(status.daily_spent, 0.0);
        assert!(!status.alert);
    }
}
