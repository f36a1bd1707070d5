pub mod health;
pub mod llm;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/llm/tasks", post(llm::handle_run_task))
        .route("/api/v1/llm/models", get(llm::handle_list_models))
        .route("/api/v1/llm/breakers/:model", get(llm::handle_breaker_status))
        .route("/api/v1/llm/performance", get(llm::handle_performance))
        .route("/api/v1/llm/budget", get(llm::handle_budget))
        .route("/api/v1/llm/best-model", get(llm::handle_best_model))
        .with_state(state)
}
