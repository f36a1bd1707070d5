use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{BreakerTransition, CostUpdate, OrchestrationStore, StoreError};
use crate::breaker::state::{BreakerSettings, CircuitBreakerState};
use crate::models::metrics::{CostTrackingEntry, PerformanceMetric};

type CostKey = (Uuid, NaiveDate, String);

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    breakers: Mutex<HashMap<String, Arc<Mutex<CircuitBreakerState>>>>,
    metrics: Mutex<Vec<PerformanceMetric>>,
    costs: Mutex<HashMap<CostKey, CostTrackingEntry>>,
    /// When set, cost entries are only kept for these users.
    known_users: Option<HashSet<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts cost tracking to `users`; anything else counts as unknown.
    pub fn with_known_users(users: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known_users: Some(users.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn cost_entry(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        model: &str,
    ) -> Option<CostTrackingEntry> {
        lock(&self.costs)
            .ok()?
            .get(&(user_id, date, model.to_string()))
            .cloned()
    }

    pub fn metric_count(&self) -> usize {
        lock(&self.metrics).map(|m| m.len()).unwrap_or(0)
    }

    fn breaker_slot(
        &self,
        model_name: &str,
        defaults: &BreakerSettings,
    ) -> Result<Arc<Mutex<CircuitBreakerState>>, StoreError> {
        let mut breakers = lock(&self.breakers)?;
        Ok(breakers
            .entry(model_name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreakerState::new(model_name, defaults)))
            })
            .clone())
    }

    fn is_known_user(&self, user_id: Uuid) -> bool {
        self.known_users
            .as_ref()
            .map_or(true, |users| users.contains(&user_id))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl OrchestrationStore for InMemoryStore {
    async fn transition_breaker(
        &self,
        model_name: &str,
        defaults: &BreakerSettings,
        transition: BreakerTransition<'_>,
    ) -> Result<CircuitBreakerState, StoreError> {
        // The map lock is released before the row lock is taken, so
        // different models never contend.
        let slot = self.breaker_slot(model_name, defaults)?;
        let mut state = lock(&slot)?;
        transition(&mut state);
        Ok(state.clone())
    }

    async fn load_breaker(
        &self,
        model_name: &str,
    ) -> Result<Option<CircuitBreakerState>, StoreError> {
        let slot = lock(&self.breakers)?.get(model_name).cloned();
        match slot {
            Some(slot) => Ok(Some(lock(&slot)?.clone())),
            None => Ok(None),
        }
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<CostUpdate, StoreError> {
        // metrics before costs, always, so the pair behaves as one transaction.
        let mut metrics = lock(&self.metrics)?;
        let mut costs = lock(&self.costs)?;
        metrics.push(metric.clone());

        let Some(user_id) = metric.user_id.filter(|_| metric.is_billable()) else {
            return Ok(CostUpdate::NotApplicable);
        };
        if !self.is_known_user(user_id) {
            return Ok(CostUpdate::SkippedUnknownUser);
        }

        let date = metric.created_at.date_naive();
        costs
            .entry((user_id, date, metric.model_name.clone()))
            .or_insert_with(|| CostTrackingEntry::new(user_id, date, &metric.model_name))
            .add_generation(metric.cost, metric.tokens_used);
        Ok(CostUpdate::Applied)
    }

    async fn metrics_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>, StoreError> {
        Ok(lock(&self.metrics)?
            .iter()
            .filter(|m| m.created_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn user_costs_since(
        &self,
        user_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<CostTrackingEntry>, StoreError> {
        Ok(lock(&self.costs)?
            .values()
            .filter(|e| e.user_id == user_id && e.date >= from)
            .cloned()
            .collect())
    }

    async fn total_cost_since(&self, from: NaiveDate) -> Result<f64, StoreError> {
        Ok(lock(&self.costs)?
            .values()
            .filter(|e| e.date >= from)
            .fold(0.0, |acc, e| acc + e.total_cost))
    }

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut metrics = lock(&self.metrics)?;
        let before = metrics.len();
        metrics.retain(|m| m.created_at >= cutoff);
        Ok((before - metrics.len()) as u64)
    }
}
