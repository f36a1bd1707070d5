use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One provider call attempt. Append-only: never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceMetric {
    pub id: Uuid,
    pub model_name: String,
    pub task_type: String,
    pub processing_time_ms: i64,
    pub tokens_used: i64,
    pub cost: f64,
    pub success: bool,
    pub quality_score: Option<f64>,
    pub complexity_score: Option<f64>,
    pub strategy: String,
    pub fallback_used: bool,
    pub user_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl PerformanceMetric {
    /// The provider returned usage, so the call was paid for even if its output was rejected.
    pub fn is_billable(&self) -> bool {
        self.cost > 0.0 || self.tokens_used > 0
    }
}

/// Daily spend aggregate keyed by (user_id, date, model_name).
/// Invariant: `avg_cost_per_generation == total_cost / generation_count`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CostTrackingEntry {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub model_name: String,
    pub generation_count: i64,
    pub total_cost: f64,
    pub avg_cost_per_generation: f64,
    pub total_tokens: i64,
}

impl CostTrackingEntry {
    pub fn new(user_id: Uuid, date: NaiveDate, model_name: &str) -> Self {
        Self {
            user_id,
            date,
            model_name: model_name.to_string(),
            generation_count: 0,
            total_cost: 0.0,
            avg_cost_per_generation: 0.0,
            total_tokens: 0,
        }
    }

    /// Folds one completed generation into the aggregate.
    pub fn add_generation(&mut self, cost: f64, tokens: i64) {
        self.generation_count += 1;
        self.total_cost += cost;
        self.total_tokens += tokens;
        self.avg_cost_per_generation = self.total_cost / self.generation_count as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_generation_keeps_average_invariant() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut entry = CostTrackingEntry::new(Uuid::new_v4(), date, "gpt-4o");
        entry.add_generation(0.01, 100);
        entry.add_generation(0.03, 300);
        assert_eq!(entry.generation_count, 2);
        assert!((entry.total_cost - 0.04).abs() < 1e-12);
        assert!((entry.avg_cost_per_generation - 0.02).abs() < 1e-12);
        assert_eq!(entry.total_tokens, 400);
    }
}
