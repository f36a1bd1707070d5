//! Orchestration Facade: the one entry point the rest of the backend uses for
//! LLM work.
//!
//! Per request: select a model, check its breaker, call the provider, classify
//! the outcome, record it, and retry once on a fallback model when the failure
//! warrants it. Each model actually called gets exactly one metric, and at most
//! one breaker update; caller faults leave the breaker untouched.

pub mod error;
mod guard;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreakerManager;
use crate::providers::output::{validate_embeddings, validate_json, TaskContent};
use crate::providers::{
    LlmProvider, ProviderError, ProviderErrorKind, ProviderRequest, TokenUsage,
};
use crate::registry::ModelRegistry;
use crate::selector::{BudgetAdjustment, ErrorContext, ModelSelector, SelectionContext};
use crate::task::{TaskInput, TaskType};
use crate::tracker::{PerformanceTracker, TaskRecord};
pub use error::OrchestrationError;
use guard::AttemptGuard;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub input: TaskInput,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Extra caller instructions appended to the prompt.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Top-level JSON fields the output should contain; drives the quality score.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl TaskRequest {
    pub fn new(input: TaskInput) -> Self {
        Self {
            input,
            user_id: None,
            instructions: None,
            max_tokens: None,
            temperature: None,
            required_fields: Vec::new(),
        }
    }
}

/// Per-call observability output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTelemetry {
    pub model_used: String,
    pub processing_time_ms: u64,
    pub tokens_used: u32,
    pub cost: f64,
    pub quality_score: Option<f64>,
    pub selection_reason: String,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub content: TaskContent,
    pub usage: TokenUsage,
    pub telemetry: CallTelemetry,
}

/// Why a single attempt failed, and whether a fallback may follow.
struct AttemptFailure {
    error: OrchestrationError,
    fallback_eligible: bool,
}

fn default_max_tokens(task_type: TaskType) -> u32 {
    match task_type {
        TaskType::CvGeneration => 4096,
        TaskType::JobParsing | TaskType::DocumentParsing => 2048,
        TaskType::Embedding => 0,
    }
}

fn default_temperature(task_type: TaskType) -> f32 {
    match task_type {
        TaskType::CvGeneration => 0.7,
        _ => 0.0,
    }
}

pub struct Orchestrator {
    registry: Arc<ModelRegistry>,
    selector: Arc<ModelSelector>,
    breakers: Arc<CircuitBreakerManager>,
    tracker: Arc<PerformanceTracker>,
    provider: Arc<dyn LlmProvider>,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        selector: Arc<ModelSelector>,
        breakers: Arc<CircuitBreakerManager>,
        tracker: Arc<PerformanceTracker>,
        provider: Arc<dyn LlmProvider>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            selector,
            breakers,
            tracker,
            provider,
            request_timeout,
        }
    }

    pub async fn execute(&self, request: TaskRequest) -> Result<TaskOutcome, OrchestrationError> {
        let input = request
            .input
            .clone()
            .validated()
            .map_err(|e| OrchestrationError::InvalidRequest(e.to_string()))?;
        let task_type = input.task_type();

        if let Some(user_id) = request.user_id {
            match self.tracker.get_user_budget_status(user_id).await {
                Ok(status) if status.over_daily_budget => {
                    warn!("User {user_id} is over the daily LLM budget; rejecting {task_type}");
                    return Err(OrchestrationError::BudgetExceeded {
                        user_id,
                        spent: status.daily_spent,
                        limit: status.daily_limit,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Budget check for user {user_id} failed, continuing: {e}"),
            }
        }

        let adjustment = match self.tracker.get_spend_totals().await {
            Ok(totals) => self.selector.optimize_for_budget(totals.daily, totals.monthly),
            Err(e) => {
                warn!("Could not read global LLM spend, using normal posture: {e}");
                BudgetAdjustment::none()
            }
        };

        let context = SelectionContext::from_input(&input, self.selector.active_strategy());
        let primary = self.selector.select_model_for_task(&context, &adjustment);

        let candidates = std::iter::once(primary.clone()).chain(self.selector.fallback_candidates(
            &primary,
            task_type,
            &context.strategy,
        ));
        let Some(model) = self.first_callable(candidates).await else {
            warn!("No callable model for {task_type}: every candidate is open or unsupported");
            return Err(OrchestrationError::AllModelsUnavailable { task_type });
        };

        let context = if model == primary {
            context
        } else {
            info!("{primary} is unavailable; routing {task_type} to {model}");
            context.for_fallback()
        };

        let failure = match self.attempt(&model, &context, &input, &request).await {
            Ok(outcome) => return Ok(outcome),
            Err(failure) => failure,
        };

        if context.fallback_attempt || !failure.fallback_eligible {
            return Err(failure.error);
        }

        let fallbacks = self
            .selector
            .fallback_candidates(&model, task_type, &context.strategy);
        let Some(fallback) = self.first_callable(fallbacks.into_iter()).await else {
            return Err(failure.error);
        };

        info!("Retrying {task_type} on fallback {fallback} after {model} failed");
        self.attempt(&fallback, &context.for_fallback(), &input, &request)
            .await
            .map_err(|f| f.error)
    }

    /// First candidate the provider can serve and whose breaker admits a call.
    async fn first_callable(&self, candidates: impl Iterator<Item = String>) -> Option<String> {
        for model in candidates {
            if !self.provider.supports(&model) {
                debug!("Skipping {model}: no provider configured");
                continue;
            }
            match self.breakers.can_attempt_request(&model).await {
                Ok(true) => return Some(model),
                Ok(false) => debug!("Skipping {model}: circuit breaker open"),
                Err(e) => {
                    warn!("Breaker check for {model} failed, allowing the call: {e}");
                    return Some(model);
                }
            }
        }
        None
    }

    async fn attempt(
        &self,
        model: &str,
        context: &SelectionContext,
        input: &TaskInput,
        request: &TaskRequest,
    ) -> Result<TaskOutcome, AttemptFailure> {
        let task_type = context.task_type;
        let selection_reason = self.selector.get_selection_reason(model, context);
        let provider_request = ProviderRequest {
            model: model.to_string(),
            input: prompts::build_input(input, request.instructions.as_deref()),
            max_tokens: request
                .max_tokens
                .unwrap_or_else(|| default_max_tokens(task_type)),
            temperature: request
                .temperature
                .unwrap_or_else(|| default_temperature(task_type)),
        };

        let record = |success: bool, metadata: serde_json::Value| TaskRecord {
            model_name: model.to_string(),
            task_type,
            processing_time_ms: 0,
            tokens_used: 0,
            cost: 0.0,
            success,
            quality_score: None,
            complexity_score: Some(context.complexity_score),
            user_id: request.user_id,
            strategy: context.strategy.clone(),
            fallback_used: context.fallback_attempt,
            metadata,
        };

        let guard = AttemptGuard::arm(
            self.breakers.clone(),
            self.tracker.clone(),
            record(
                false,
                json!({
                    "error_kind": "connection",
                    "error": "cancelled",
                    "selection_reason": selection_reason,
                }),
            ),
        );
        let started = Instant::now();
        let result =
            match tokio::time::timeout(self.request_timeout, self.provider.call(&provider_request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    ProviderErrorKind::Connection,
                    format!("timed out after {}s", self.request_timeout.as_secs_f64()),
                )),
            };
        let processing_time_ms = started.elapsed().as_millis() as u64;
        guard.disarm();

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                let metric = record(false, json!({}));
                let failure = self
                    .record_provider_failure(
                        model,
                        error,
                        processing_time_ms,
                        metric,
                        &selection_reason,
                    )
                    .await;
                return Err(failure);
            }
        };

        let usage = response.usage;
        let cost = self
            .registry
            .calculate_cost(model, usage.input_tokens, usage.output_tokens)
            .unwrap_or_else(|e| {
                warn!("Cannot price call to {model}: {e}");
                0.0
            });

        let validated = match task_type {
            TaskType::Embedding => validate_embeddings(&response.content, input.item_count()),
            _ => validate_json(&response.content, &request.required_fields),
        };

        // A well-formed round trip, whatever the content, is a healthy model.
        if let Err(e) = self.breakers.record_success(model).await {
            warn!("Failed to record breaker success for {model}: {e}");
        }

        let mut metric = record(true, json!({ "selection_reason": selection_reason }));
        metric.processing_time_ms = processing_time_ms;
        metric.tokens_used = usage.total();
        metric.cost = cost;

        match validated {
            Ok(output) => {
                metric.quality_score = output.quality_score;
                self.tracker.record_task(metric).await;
                info!(
                    model = %model,
                    task_type = %task_type,
                    latency_ms = processing_time_ms,
                    tokens = usage.total(),
                    cost,
                    fallback = context.fallback_attempt,
                    "LLM call succeeded"
                );
                Ok(TaskOutcome {
                    content: output.content,
                    usage,
                    telemetry: CallTelemetry {
                        model_used: model.to_string(),
                        processing_time_ms,
                        tokens_used: usage.total(),
                        cost,
                        quality_score: output.quality_score,
                        selection_reason,
                        fallback_used: context.fallback_attempt,
                    },
                })
            }
            Err(malformed) => {
                warn!("{model} returned malformed output for {task_type}: {malformed}");
                metric.success = false;
                metric.metadata = json!({
                    "error_kind": "malformed_output",
                    "error": malformed.0,
                    "selection_reason": selection_reason,
                });
                self.tracker.record_task(metric).await;
                Err(AttemptFailure {
                    error: OrchestrationError::MalformedProviderOutput {
                        model: model.to_string(),
                        message: malformed.0,
                    },
                    fallback_eligible: false,
                })
            }
        }
    }

    async fn record_provider_failure(
        &self,
        model: &str,
        error: ProviderError,
        processing_time_ms: u64,
        mut metric: TaskRecord,
        selection_reason: &str,
    ) -> AttemptFailure {
        let consecutive_errors = if error.kind.counts_against_breaker() {
            match self.breakers.record_failure(model).await {
                Ok(status) => status.failure_count,
                Err(e) => {
                    warn!("Failed to record breaker failure for {model}: {e}");
                    1
                }
            }
        } else {
            0
        };

        warn!(
            model = %model,
            kind = %error.kind,
            status = ?error.status,
            latency_ms = processing_time_ms,
            "LLM call failed: {}",
            error.message
        );

        metric.processing_time_ms = processing_time_ms;
        metric.metadata = json!({
            "error_kind": error.kind.as_str(),
            "status": error.status,
            "error": error.message,
            "selection_reason": selection_reason,
        });
        self.tracker.record_task(metric).await;

        let fallback_eligible = self.selector.should_use_fallback(
            model,
            &ErrorContext {
                kind: error.kind,
                consecutive_errors,
            },
        );
        AttemptFailure {
            error: OrchestrationError::from_provider(model, error),
            fallback_eligible,
        }
    }
}
