//! Circuit Breaker Manager: decides whether a model may be called.
//!
//! Every read-modify-write goes through `OrchestrationStore::transition_breaker`,
//! which holds the per-model lock only for the duration of the state update.

pub mod state;

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::store::{OrchestrationStore, StoreError};
use state::{BreakerSettings, BreakerState, CircuitBreakerState, CircuitBreakerStatus};

pub struct CircuitBreakerManager {
    store: Arc<dyn OrchestrationStore>,
    clock: Arc<dyn Clock>,
    settings: BreakerSettings,
}

impl CircuitBreakerManager {
    pub fn new(
        store: Arc<dyn OrchestrationStore>,
        clock: Arc<dyn Clock>,
        settings: BreakerSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// True for closed and half_open breakers. An open breaker whose timeout
    /// has elapsed is moved to half_open here and admitted.
    pub async fn can_attempt_request(&self, model_name: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let state = self
            .transition(model_name, |s| {
                let was_open = s.state == BreakerState::Open;
                if s.allow_request(now) && was_open {
                    info!("Circuit breaker for {} is now half_open", s.model_name);
                }
            })
            .await?;
        Ok(state.state != BreakerState::Open)
    }

    pub async fn record_success(
        &self,
        model_name: &str,
    ) -> Result<CircuitBreakerStatus, StoreError> {
        let state = self
            .transition(model_name, |s| {
                if s.state != BreakerState::Closed {
                    info!("Circuit breaker for {} closed after success", s.model_name);
                }
                s.on_success();
            })
            .await?;
        Ok(state.status(self.clock.now()))
    }

    pub async fn record_failure(
        &self,
        model_name: &str,
    ) -> Result<CircuitBreakerStatus, StoreError> {
        let now = self.clock.now();
        let state = self
            .transition(model_name, |s| {
                let before = s.state;
                s.on_failure(now);
                if before != BreakerState::Open && s.state == BreakerState::Open {
                    warn!(
                        "Circuit breaker for {} opened after {} failures",
                        s.model_name, s.failure_count
                    );
                }
            })
            .await?;
        Ok(state.status(now))
    }

    /// Status without side effects. A model never seen reports a fresh closed breaker.
    pub async fn get_breaker_status(
        &self,
        model_name: &str,
    ) -> Result<CircuitBreakerStatus, StoreError> {
        let mut state = self
            .store
            .load_breaker(model_name)
            .await?
            .unwrap_or_else(|| CircuitBreakerState::new(model_name, &self.settings));
        state.apply_settings(&self.settings);
        Ok(state.status(self.clock.now()))
    }

    /// Persisted rows may predate a config change; the current limits always win.
    async fn transition<F>(
        &self,
        model_name: &str,
        f: F,
    ) -> Result<CircuitBreakerState, StoreError>
    where
        F: Fn(&mut CircuitBreakerState) + Send + Sync,
    {
        let settings = self.settings;
        self.store
            .transition_breaker(model_name, &settings, &|s: &mut CircuitBreakerState| {
                s.apply_settings(&settings);
                f(s);
            })
            .await
    }
}
