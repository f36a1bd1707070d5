use thiserror::Error;
use uuid::Uuid;

use crate::providers::{ProviderError, ProviderErrorKind};
use crate::task::TaskType;

/// Every way a task can fail, as seen by callers of the orchestrator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestrationError {
    #[error("{model} is rate limited: {message}")]
    RateLimited { model: String, message: String },

    #[error("{model} rejected the credentials: {message}")]
    Unauthenticated { model: String, message: String },

    #[error("{model} denied access: {message}")]
    PermissionDenied { model: String, message: String },

    #[error("Could not reach {model}: {message}")]
    ConnectionFailed { model: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{model} failed internally: {message}")]
    ProviderInternalError { model: String, message: String },

    #[error("No model is available for {task_type}")]
    AllModelsUnavailable { task_type: TaskType },

    #[error("{model} returned malformed output: {message}")]
    MalformedProviderOutput { model: String, message: String },

    #[error("User {user_id} has spent ${spent:.2} of a ${limit:.2} daily budget")]
    BudgetExceeded { user_id: Uuid, spent: f64, limit: f64 },
}

impl OrchestrationError {
    pub fn from_provider(model: &str, error: ProviderError) -> Self {
        let model = model.to_string();
        let message = error.message;
        match error.kind {
            ProviderErrorKind::RateLimit | ProviderErrorKind::QuotaExceeded => {
                Self::RateLimited { model, message }
            }
            ProviderErrorKind::Auth => Self::Unauthenticated { model, message },
            ProviderErrorKind::Permission => Self::PermissionDenied { model, message },
            ProviderErrorKind::Connection => Self::ConnectionFailed { model, message },
            ProviderErrorKind::BadRequest => Self::InvalidRequest(format!("{model}: {message}")),
            ProviderErrorKind::ServerError | ProviderErrorKind::Unknown => {
                Self::ProviderInternalError { model, message }
            }
        }
    }

    /// Stable machine-readable code for API bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Unauthenticated { .. } => "PROVIDER_UNAUTHENTICATED",
            Self::PermissionDenied { .. } => "PROVIDER_PERMISSION_DENIED",
            Self::ConnectionFailed { .. } => "PROVIDER_CONNECTION_FAILED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ProviderInternalError { .. } => "PROVIDER_INTERNAL_ERROR",
            Self::AllModelsUnavailable { .. } => "ALL_MODELS_UNAVAILABLE",
            Self::MalformedProviderOutput { .. } => "MALFORMED_PROVIDER_OUTPUT",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
        }
    }
}
