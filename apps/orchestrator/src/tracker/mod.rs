//! Performance Tracker: append-only call log plus per-user daily cost aggregates.
//!
//! Recording is fire-and-forget from the caller's point of view: a storage
//! failure is logged and swallowed so it can never change a task outcome.

pub mod summary;

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::BudgetConfig;
use crate::models::metrics::PerformanceMetric;
use crate::store::{CostUpdate, OrchestrationStore, StoreError};
use crate::task::TaskType;
use summary::{best_model, summarize, ModelPerformanceSummary, Priority};

/// How far back `get_best_model_for_task` looks.
const BEST_MODEL_HISTORY_DAYS: i64 = 30;

/// Everything known about one provider call attempt.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub model_name: String,
    pub task_type: TaskType,
    pub processing_time_ms: u64,
    pub tokens_used: u32,
    pub cost: f64,
    pub success: bool,
    pub quality_score: Option<f64>,
    pub complexity_score: Option<f64>,
    pub user_id: Option<Uuid>,
    pub strategy: String,
    pub fallback_used: bool,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetStatus {
    pub user_id: Uuid,
    pub daily_spent: f64,
    pub daily_limit: f64,
    pub daily_remaining: f64,
    pub monthly_spent: f64,
    pub monthly_limit: f64,
    pub monthly_remaining: f64,
    pub over_daily_budget: bool,
    pub over_monthly_budget: bool,
    /// Either limit has crossed `alert_threshold`.
    pub alert: bool,
}

/// Spend across all users, the input to budget-driven downgrades.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SpendTotals {
    pub daily: f64,
    pub monthly: f64,
}

pub struct PerformanceTracker {
    store: Arc<dyn OrchestrationStore>,
    clock: Arc<dyn Clock>,
    budgets: BudgetConfig,
}

impl PerformanceTracker {
    pub fn new(
        store: Arc<dyn OrchestrationStore>,
        clock: Arc<dyn Clock>,
        budgets: BudgetConfig,
    ) -> Self {
        Self {
            store,
            clock,
            budgets,
        }
    }

    pub fn budgets(&self) -> &BudgetConfig {
        &self.budgets
    }

    /// Appends one metric and folds it into the user's daily cost entry.
    pub async fn record_task(&self, record: TaskRecord) {
        let metric = PerformanceMetric {
            id: Uuid::new_v4(),
            model_name: record.model_name,
            task_type: record.task_type.as_str().to_string(),
            processing_time_ms: record.processing_time_ms as i64,
            tokens_used: record.tokens_used as i64,
            cost: record.cost,
            success: record.success,
            quality_score: record.quality_score.map(|q| q.clamp(0.0, 1.0)),
            complexity_score: record.complexity_score,
            strategy: record.strategy,
            fallback_used: record.fallback_used,
            user_id: record.user_id,
            metadata: record.metadata,
            created_at: self.clock.now(),
        };

        match self.store.record_metric(&metric).await {
            Ok(CostUpdate::SkippedUnknownUser) => {
                debug!(
                    "Metric for {} recorded; cost tracking skipped for unknown user",
                    metric.model_name
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    "Failed to record performance metric for {} ({}): {e}",
                    metric.model_name, metric.task_type
                );
            }
        }
    }

    pub async fn get_model_performance_summary(
        &self,
        days: i64,
    ) -> Result<Vec<ModelPerformanceSummary>, StoreError> {
        let cutoff = self.clock.now() - Duration::days(days.max(0));
        let metrics = self.store.metrics_since(cutoff).await?;
        Ok(summarize(&metrics))
    }

    pub async fn get_user_budget_status(&self, user_id: Uuid) -> Result<BudgetStatus, StoreError> {
        let today = self.clock.now().date_naive();
        let month_start = first_of_month(today);
        let entries = self.store.user_costs_since(user_id, month_start).await?;

        // fold from +0.0: an empty f64 sum is -0.0
        let monthly_spent = entries.iter().fold(0.0, |acc, e| acc + e.total_cost);
        let daily_spent = entries
            .iter()
            .filter(|e| e.date == today)
            .fold(0.0, |acc, e| acc + e.total_cost);

        let daily_limit = self.budgets.per_user_daily_cap;
        let monthly_limit = self.budgets.monthly_budget;
        let threshold = self.budgets.alert_threshold;

        Ok(BudgetStatus {
            user_id,
            daily_spent,
            daily_limit,
            daily_remaining: (daily_limit - daily_spent).max(0.0),
            monthly_spent,
            monthly_limit,
            monthly_remaining: (monthly_limit - monthly_spent).max(0.0),
            over_daily_budget: daily_spent >= daily_limit,
            over_monthly_budget: monthly_spent >= monthly_limit,
            alert: daily_spent >= daily_limit * threshold
                || monthly_spent >= monthly_limit * threshold,
        })
    }

    pub async fn get_spend_totals(&self) -> Result<SpendTotals, StoreError> {
        let today = self.clock.now().date_naive();
        Ok(SpendTotals {
            daily: self.store.total_cost_since(today).await?,
            monthly: self.store.total_cost_since(first_of_month(today)).await?,
        })
    }

    /// Best model for `task_type` over the last 30 days of history, if any.
    pub async fn get_best_model_for_task(
        &self,
        task_type: TaskType,
        priority: Priority,
    ) -> Result<Option<String>, StoreError> {
        let cutoff = self.clock.now() - Duration::days(BEST_MODEL_HISTORY_DAYS);
        let metrics = self.store.metrics_since(cutoff).await?;
        Ok(best_model(&metrics, task_type.as_str(), priority))
    }

    /// Deletes metrics older than `days_to_keep` days. Cost aggregates are kept.
    pub async fn cleanup_old_metrics(&self, days_to_keep: i64) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - Duration::days(days_to_keep.max(0));
        let deleted = self.store.delete_metrics_before(cutoff).await?;
        info!("Deleted {deleted} performance metrics older than {days_to_keep} days");
        Ok(deleted)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{BreakerTransition, InMemoryStore};
    use crate::breaker::state::{BreakerSettings, CircuitBreakerState};
    use crate::models::metrics::CostTrackingEntry;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn record(model: &str, cost: f64, user_id: Option<Uuid>) -> TaskRecord {
        TaskRecord {
            model_name: model.to_string(),
            task_type: TaskType::CvGeneration,
            processing_time_ms: 1200,
            tokens_used: 800,
            cost,
            success: true,
            quality_score: Some(0.8),
            complexity_score: Some(0.5),
            user_id,
            strategy: "balanced".to_string(),
            fallback_used: false,
            metadata: json!({}),
        }
    }

    fn tracker_at(
        now: DateTime<Utc>,
    ) -> (PerformanceTracker, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let tracker =
            PerformanceTracker::new(store.clone(), clock.clone(), BudgetConfig::default());
        (tracker, store, clock)
    }

    #[tokio::test]
    async fn test_two_records_aggregate_cost_entry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let (tracker, store, _) = tracker_at(now);
        let user = Uuid::from_u128(42);

        tracker.record_task(record("m", 0.01, Some(user))).await;
        tracker.record_task(record("m", 0.01, Some(user))).await;

        let entry = store.cost_entry(user, now.date_naive(), "m").unwrap();
        assert_eq!(entry.generation_count, 2);
        assert!((entry.total_cost - 0.02).abs() < 1e-12);
        assert!((entry.avg_cost_per_generation - 0.01).abs() < 1e-12);
        assert_eq!(entry.total_tokens, 1600);
        assert_eq!(store.metric_count(), 2);
    }

    #[tokio::test]
    async fn test_quality_score_is_clamped() {
        let (tracker, store, _) = tracker_at(Utc::now());
        let mut r = record("m", 0.0, None);
        r.quality_score = Some(1.7);
        tracker.record_task(r).await;
        let metrics = store.metrics_since(Utc::now() - Duration::days(1)).await.unwrap();
        assert_eq!(metrics[0].quality_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_budget_status_daily_and_monthly() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let (tracker, _, clock) = tracker_at(now);
        let user = Uuid::new_v4();

        tracker.record_task(record("gpt-4o", 3.0, Some(user))).await;
        clock.advance(Duration::days(1));
        tracker.record_task(record("gpt-4o", 4.5, Some(user))).await;

        let status = tracker.get_user_budget_status(user).await.unwrap();
        assert!((status.daily_spent - 4.5).abs() < 1e-9);
        assert!((status.monthly_spent - 7.5).abs() < 1e-9);
        assert!((status.daily_remaining - 0.5).abs() < 1e-9);
        assert!(!status.over_daily_budget);
        assert!(status.alert, "4.5 of 5.0 crosses the 0.8 alert threshold");
    }

    #[tokio::test]
    async fn test_budget_status_for_new_user_reports_positive_zero() {
        let (tracker, _, _) = tracker_at(Utc::now());
        let status = tracker.get_user_budget_status(Uuid::new_v4()).await.unwrap();
        assert!(status.daily_spent.is_sign_positive());
        assert!(status.monthly_spent.is_sign_positive());

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["daily_spent"].to_string(), "0.0");

        let totals = tracker.get_spend_totals().await.unwrap();
        assert!(totals.daily.is_sign_positive());
    }

    #[tokio::test]
    async fn test_budget_status_over_daily_cap() {
        let (tracker, _, _) = tracker_at(Utc::now());
        let user = Uuid::new_v4();
        tracker.record_task(record("gpt-5", 5.5, Some(user))).await;
        let status = tracker.get_user_budget_status(user).await.unwrap();
        assert!(status.over_daily_budget);
        assert_eq!(status.daily_remaining, 0.0);
    }

    #[tokio::test]
    async fn test_best_model_for_task_uses_history() {
        let (tracker, _, _) = tracker_at(Utc::now());
        for _ in 0..3 {
            tracker.record_task(record("gpt-4o", 0.008, None)).await;
            tracker.record_task(record("gpt-4o-mini", 0.002, None)).await;
        }
        let best = tracker
            .get_best_model_for_task(TaskType::CvGeneration, Priority::Cost)
            .await
            .unwrap();
        assert_eq!(best.as_deref(), Some("gpt-4o-mini"));

        let none = tracker
            .get_best_model_for_task(TaskType::Embedding, Priority::Cost)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_old_metrics() {
        let (tracker, store, clock) = tracker_at(Utc::now());
        tracker.record_task(record("gpt-4o", 0.01, None)).await;
        clock.advance(Duration::days(40));
        tracker.record_task(record("gpt-4o", 0.01, None)).await;

        assert_eq!(tracker.cleanup_old_metrics(30).await.unwrap(), 1);
        assert_eq!(store.metric_count(), 1);
    }

    #[tokio::test]
    async fn test_spend_totals() {
        let (tracker, _, _) = tracker_at(Utc::now());
        tracker.record_task(record("gpt-4o", 1.25, Some(Uuid::new_v4()))).await;
        tracker.record_task(record("gpt-4o", 0.75, Some(Uuid::new_v4()))).await;
        let totals = tracker.get_spend_totals().await.unwrap();
        assert!((totals.daily - 2.0).abs() < 1e-9);
        assert!((totals.monthly - 2.0).abs() < 1e-9);
    }

    struct BrokenStore;

    #[async_trait]
    impl OrchestrationStore for BrokenStore {
        async fn transition_breaker(
            &self,
            _model_name: &str,
            _defaults: &BreakerSettings,
            _transition: BreakerTransition<'_>,
        ) -> Result<CircuitBreakerState, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn load_breaker(&self, _: &str) -> Result<Option<CircuitBreakerState>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn record_metric(&self, _: &PerformanceMetric) -> Result<CostUpdate, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn metrics_since(
            &self,
            _: DateTime<Utc>,
        ) -> Result<Vec<PerformanceMetric>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn user_costs_since(
            &self,
            _: Uuid,
            _: NaiveDate,
        ) -> Result<Vec<CostTrackingEntry>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn total_cost_since(&self, _: NaiveDate) -> Result<f64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn delete_metrics_before(&self, _: DateTime<Utc>) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_record_task_swallows_storage_failure() {
        let tracker = PerformanceTracker::new(
            Arc::new(BrokenStore),
            Arc::new(ManualClock::new(Utc::now())),
            BudgetConfig::default(),
        );
        // Must not panic or propagate.
        tracker.record_task(record("gpt-4o", 0.01, None)).await;
        assert!(tracker.get_model_performance_summary(7).await.is_err());
    }
}
