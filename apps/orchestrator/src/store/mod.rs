//! Persistence seam for the orchestration core.
//!
//! `PgStore` is the production backend; `InMemoryStore` backs local runs
//! without `DATABASE_URL` and every unit test. Both serialize writers per key:
//! a breaker row per model, a cost row per (user, date, model).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::breaker::state::{BreakerSettings, CircuitBreakerState};
use crate::models::metrics::{CostTrackingEntry, PerformanceMetric};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Mutation applied to a breaker row while its lock is held.
pub type BreakerTransition<'a> = &'a (dyn Fn(&mut CircuitBreakerState) + Send + Sync);

/// What happened to the cost aggregate when a metric was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostUpdate {
    Applied,
    /// The metric named a user the CRUD layer does not know.
    SkippedUnknownUser,
    /// Nothing was billed, or the call was anonymous.
    NotApplicable,
}

#[async_trait]
pub trait OrchestrationStore: Send + Sync {
    /// Get-or-create the breaker row for `model_name`, apply `transition`
    /// under a per-model lock, persist and return the new state.
    async fn transition_breaker(
        &self,
        model_name: &str,
        defaults: &BreakerSettings,
        transition: BreakerTransition<'_>,
    ) -> Result<CircuitBreakerState, StoreError>;

    async fn load_breaker(&self, model_name: &str)
        -> Result<Option<CircuitBreakerState>, StoreError>;

    /// Appends the metric and, for a successful attempt by a known user,
    /// upserts the (user, date, model) cost entry in the same transaction.
    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<CostUpdate, StoreError>;

    async fn metrics_since(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<PerformanceMetric>, StoreError>;

    async fn user_costs_since(
        &self,
        user_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<CostTrackingEntry>, StoreError>;

    /// Total spend across all users from `from` (inclusive).
    async fn total_cost_since(&self, from: NaiveDate) -> Result<f64, StoreError>;

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
