use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{BreakerTransition, CostUpdate, OrchestrationStore, StoreError};
use crate::breaker::state::{BreakerSettings, CircuitBreakerState};
use crate::models::metrics::{CostTrackingEntry, PerformanceMetric};

/// PostgreSQL backend. Breaker rows are serialized with `SELECT ... FOR UPDATE`;
/// cost rows with an atomic `INSERT ... ON CONFLICT DO UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CircuitBreakerRow {
    model_name: String,
    failure_count: i32,
    last_failure: Option<DateTime<Utc>>,
    state: String,
    failure_threshold: i32,
    timeout_seconds: i64,
}

impl TryFrom<CircuitBreakerRow> for CircuitBreakerState {
    type Error = StoreError;

    fn try_from(row: CircuitBreakerRow) -> Result<Self, Self::Error> {
        Ok(CircuitBreakerState {
            state: row.state.parse().map_err(StoreError::Corrupt)?,
            model_name: row.model_name,
            failure_count: row.failure_count.max(0) as u32,
            last_failure: row.last_failure,
            failure_threshold: row.failure_threshold.max(1) as u32,
            timeout_seconds: row.timeout_seconds,
        })
    }
}

#[async_trait]
impl OrchestrationStore for PgStore {
    async fn transition_breaker(
        &self,
        model_name: &str,
        defaults: &BreakerSettings,
        transition: BreakerTransition<'_>,
    ) -> Result<CircuitBreakerState, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO llm_circuit_breakers
                (model_name, failure_count, last_failure, state, failure_threshold, timeout_seconds)
            VALUES ($1, 0, NULL, 'closed', $2, $3)
            ON CONFLICT (model_name) DO UPDATE SET
                failure_threshold = EXCLUDED.failure_threshold,
                timeout_seconds = EXCLUDED.timeout_seconds
            "#,
        )
        .bind(model_name)
        .bind(defaults.failure_threshold as i32)
        .bind(defaults.timeout.num_seconds())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, CircuitBreakerRow>(
            r#"
            SELECT model_name, failure_count, last_failure, state,
                   failure_threshold, timeout_seconds
            FROM llm_circuit_breakers
            WHERE model_name = $1
            FOR UPDATE
            "#,
        )
        .bind(model_name)
        .fetch_one(&mut *tx)
        .await?;

        let mut state = CircuitBreakerState::try_from(row)?;
        transition(&mut state);

        sqlx::query(
            r#"
            UPDATE llm_circuit_breakers
            SET failure_count = $2, last_failure = $3, state = $4, updated_at = NOW()
            WHERE model_name = $1
            "#,
        )
        .bind(model_name)
        .bind(state.failure_count as i32)
        .bind(state.last_failure)
        .bind(state.state.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(state)
    }

    async fn load_breaker(
        &self,
        model_name: &str,
    ) -> Result<Option<CircuitBreakerState>, StoreError> {
        let row = sqlx::query_as::<_, CircuitBreakerRow>(
            r#"
            SELECT model_name, failure_count, last_failure, state,
                   failure_threshold, timeout_seconds
            FROM llm_circuit_breakers
            WHERE model_name = $1
            "#,
        )
        .bind(model_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CircuitBreakerState::try_from).transpose()
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<CostUpdate, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO llm_performance_metrics
                (id, model_name, task_type, processing_time_ms, tokens_used, cost, success,
                 quality_score, complexity_score, strategy, fallback_used, user_id, metadata,
                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(metric.id)
        .bind(&metric.model_name)
        .bind(&metric.task_type)
        .bind(metric.processing_time_ms)
        .bind(metric.tokens_used)
        .bind(metric.cost)
        .bind(metric.success)
        .bind(metric.quality_score)
        .bind(metric.complexity_score)
        .bind(&metric.strategy)
        .bind(metric.fallback_used)
        .bind(metric.user_id)
        .bind(&metric.metadata)
        .bind(metric.created_at)
        .execute(&mut *tx)
        .await?;

        let update = match metric.user_id.filter(|_| metric.is_billable()) {
            None => CostUpdate::NotApplicable,
            Some(user_id) => {
                let known: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                        .bind(user_id)
                        .fetch_one(&mut *tx)
                        .await?;

                if known {
                    sqlx::query(
                        r#"
                        INSERT INTO llm_cost_tracking
                            (user_id, date, model_name, generation_count, total_cost,
                             avg_cost_per_generation, total_tokens)
                        VALUES ($1, $2, $3, 1, $4, $4, $5)
                        ON CONFLICT (user_id, date, model_name) DO UPDATE SET
                            generation_count = llm_cost_tracking.generation_count + 1,
                            total_cost = llm_cost_tracking.total_cost + EXCLUDED.total_cost,
                            total_tokens = llm_cost_tracking.total_tokens + EXCLUDED.total_tokens,
                            avg_cost_per_generation =
                                (llm_cost_tracking.total_cost + EXCLUDED.total_cost)
                                / (llm_cost_tracking.generation_count + 1)
                        "#,
                    )
                    .bind(user_id)
                    .bind(metric.created_at.date_naive())
                    .bind(&metric.model_name)
                    .bind(metric.cost)
                    .bind(metric.tokens_used)
                    .execute(&mut *tx)
                    .await?;
                    CostUpdate::Applied
                } else {
                    debug!("Skipping cost tracking for unknown user {user_id}");
                    CostUpdate::SkippedUnknownUser
                }
            }
        };

        tx.commit().await?;
        Ok(update)
    }

    async fn metrics_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>, StoreError> {
        Ok(sqlx::query_as::<_, PerformanceMetric>(
            "SELECT * FROM llm_performance_metrics WHERE created_at >= $1 ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn user_costs_since(
        &self,
        user_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<CostTrackingEntry>, StoreError> {
        Ok(sqlx::query_as::<_, CostTrackingEntry>(
            r#"
            SELECT user_id, date, model_name, generation_count, total_cost,
                   avg_cost_per_generation, total_tokens
            FROM llm_cost_tracking
            WHERE user_id = $1 AND date >= $2
            "#,
        )
        .bind(user_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn total_cost_since(&self, from: NaiveDate) -> Result<f64, StoreError> {
        let total: Option<f64> =
            sqlx::query_scalar("SELECT SUM(total_cost) FROM llm_cost_tracking WHERE date >= $1")
                .bind(from)
                .fetch_one(&self.pool)
                .await?;
        Ok(total.unwrap_or(0.0))
    }

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM llm_performance_metrics WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
