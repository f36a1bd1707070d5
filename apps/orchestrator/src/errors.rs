use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::orchestrator::OrchestrationError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

fn orchestration_status(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OrchestrationError::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        OrchestrationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        OrchestrationError::AllModelsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestrationError::Unauthenticated { .. }
        | OrchestrationError::PermissionDenied { .. }
        | OrchestrationError::ConnectionFailed { .. }
        | OrchestrationError::ProviderInternalError { .. }
        | OrchestrationError::MalformedProviderOutput { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Orchestration(e) => {
                let status = orchestration_status(e);
                if status.is_server_error() {
                    tracing::error!("LLM orchestration error: {e}");
                }
                // Provider credential problems are ours, not the caller's.
                let message = match e {
                    OrchestrationError::Unauthenticated { .. }
                    | OrchestrationError::PermissionDenied { .. } => {
                        "The AI provider rejected the service credentials".to_string()
                    }
                    other => other.to_string(),
                };
                (status, e.code(), message)
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
