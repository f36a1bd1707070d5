//! Per-model circuit breaker state machine.
//!
//! Transitions are pure methods over `CircuitBreakerState`; the manager applies
//! them inside a store transaction so each model's updates are serialized.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreakerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(BreakerState::Closed),
            "open" => Ok(BreakerState::Open),
            "half_open" => Ok(BreakerState::HalfOpen),
            other => Err(format!("unknown breaker state '{other}'")),
        }
    }
}

/// Defaults applied when a breaker row is created lazily.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub model_name: String,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub state: BreakerState,
    pub failure_threshold: u32,
    pub timeout_seconds: i64,
}

impl CircuitBreakerState {
    pub fn new(model_name: &str, settings: &BreakerSettings) -> Self {
        Self {
            model_name: model_name.to_string(),
            failure_count: 0,
            last_failure: None,
            state: BreakerState::Closed,
            failure_threshold: settings.failure_threshold.max(1),
            timeout_seconds: settings.timeout.num_seconds(),
        }
    }

    /// Adopts the configured limits. Counters and state are kept.
    pub fn apply_settings(&mut self, settings: &BreakerSettings) {
        self.failure_threshold = settings.failure_threshold.max(1);
        self.timeout_seconds = settings.timeout.num_seconds();
    }

    pub fn timeout(&self) -> Duration {
        Duration::seconds(self.timeout_seconds)
    }

    /// Gate check. Flips open → half_open once the timeout has elapsed since
    /// the last failure, so the next caller gets a single probe.
    pub fn allow_request(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|at| now - at >= self.timeout())
                    .unwrap_or(true);
                if elapsed {
                    self.state = BreakerState::HalfOpen;
                }
                elapsed
            }
        }
    }

    /// Any success closes the breaker and forgets prior failures.
    pub fn on_success(&mut self) {
        self.failure_count = 0;
        self.last_failure = None;
        self.state = BreakerState::Closed;
    }

    pub fn on_failure(&mut self, now: DateTime<Utc>) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        match self.state {
            BreakerState::HalfOpen => self.state = BreakerState::Open,
            BreakerState::Closed if self.failure_count >= self.failure_threshold => {
                self.state = BreakerState::Open
            }
            _ => {}
        }
    }

    /// Time left before an open breaker admits a probe. Zero when not open.
    pub fn time_until_retry(&self, now: DateTime<Utc>) -> Duration {
        match (self.state, self.last_failure) {
            (BreakerState::Open, Some(at)) => (self.timeout() - (now - at)).max(Duration::zero()),
            _ => Duration::zero(),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            model_name: self.model_name.clone(),
            failure_count: self.failure_count,
            state: self.state,
            time_until_retry_secs: self.time_until_retry(now).num_milliseconds() as f64 / 1000.0,
            is_healthy: self.state == BreakerState::Closed,
        }
    }
}

/// Read-only breaker snapshot for callers and the ops endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub model_name: String,
    pub failure_count: u32,
    pub state: BreakerState,
    pub time_until_retry_secs: f64,
    pub is_healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> CircuitBreakerState {
        CircuitBreakerState::new("gpt-4o", &BreakerSettings::default())
    }

    #[test]
    fn test_apply_settings_keeps_counters() {
        let mut breaker = fresh();
        breaker.on_failure(Utc::now());
        breaker.apply_settings(&BreakerSettings {
            failure_threshold: 0,
            timeout: Duration::seconds(90),
        });
        assert_eq!(breaker.failure_threshold, 1);
        assert_eq!(breaker.timeout_seconds, 90);
        assert_eq!(breaker.failure_count, 1);
        assert_eq!(breaker.state, BreakerState::Closed);
    }

    #[test]
    fn test_fresh_breaker_is_closed_and_allows() {
        let mut breaker = fresh();
        assert_eq!(breaker.state, BreakerState::Closed);
        assert!(breaker.allow_request(Utc::now()));
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let now = Utc::now();
        let mut breaker = fresh();
        for _ in 0..4 {
            breaker.on_failure(now);
        }
        assert_eq!(breaker.state, BreakerState::Closed);
        breaker.on_failure(now);
        assert_eq!(breaker.state, BreakerState::Open);
        assert!(!breaker.allow_request(now));
    }

    #[test]
    fn test_open_flips_to_half_open_after_timeout() {
        let now = Utc::now();
        let mut breaker = fresh();
        for _ in 0..5 {
            breaker.on_failure(now);
        }
        assert!(!breaker.allow_request(now + Duration::seconds(29)));
        assert_eq!(breaker.state, BreakerState::Open);
        assert!(breaker.allow_request(now + Duration::seconds(30)));
        assert_eq!(breaker.state, BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens_and_restarts_timer() {
        let now = Utc::now();
        let mut breaker = fresh();
        for _ in 0..5 {
            breaker.on_failure(now);
        }
        let probe_at = now + Duration::seconds(31);
        assert!(breaker.allow_request(probe_at));
        breaker.on_failure(probe_at);
        assert_eq!(breaker.state, BreakerState::Open);
        assert!(!breaker.allow_request(probe_at + Duration::seconds(10)));
        assert_eq!(
            breaker.time_until_retry(probe_at + Duration::seconds(10)),
            Duration::seconds(20)
        );
    }

    #[test]
    fn test_success_resets_from_any_state() {
        let now = Utc::now();
        for target in [BreakerState::Closed, BreakerState::Open, BreakerState::HalfOpen] {
            let mut breaker = fresh();
            breaker.on_failure(now);
            breaker.state = target;
            breaker.on_success();
            assert_eq!(breaker.state, BreakerState::Closed);
            assert_eq!(breaker.failure_count, 0);
            assert!(breaker.last_failure.is_none());
        }
    }

    #[test]
    fn test_status_reports_health_and_retry() {
        let now = Utc::now();
        let mut breaker = fresh();
        assert!(breaker.status(now).is_healthy);
        for _ in 0..5 {
            breaker.on_failure(now);
        }
        let status = breaker.status(now + Duration::seconds(10));
        assert!(!status.is_healthy);
        assert_eq!(status.failure_count, 5);
        assert!((status.time_until_retry_secs - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_breaker_state_parses_round_trip_names() {
        for state in [BreakerState::Closed, BreakerState::Open, BreakerState::HalfOpen] {
            assert_eq!(state.as_str().parse::<BreakerState>().unwrap(), state);
        }
        assert!("tripped".parse::<BreakerState>().is_err());
    }
}
