use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Duration;

use crate::breaker::state::BreakerSettings;
use crate::selector::strategy::StrategyTable;

const MAX_BREAKER_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

/// Spend limits in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetConfig {
    pub daily_budget: f64,
    pub monthly_budget: f64,
    pub per_user_daily_cap: f64,
    /// Fraction of a limit at which the budget status raises an alert.
    pub alert_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget: 50.0,
            monthly_budget: 1000.0,
            per_user_daily_cap: 5.0,
            alert_threshold: 0.8,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup on malformed values; provider keys and the database are optional.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent → in-memory store (breaker state and metrics do not survive restarts).
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub active_strategy: String,
    pub strategy_table_path: Option<PathBuf>,
    pub budgets: BudgetConfig,
    pub breaker: BreakerSettings,
    pub request_timeout: std::time::Duration,
    pub metrics_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = BudgetConfig::default();
        let breaker_defaults = BreakerSettings::default();

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            active_strategy: std::env::var("LLM_STRATEGY")
                .unwrap_or_else(|_| "balanced".to_string()),
            strategy_table_path: optional_env("LLM_STRATEGY_TABLE_PATH").map(PathBuf::from),
            budgets: BudgetConfig {
                daily_budget: parse_env("LLM_DAILY_BUDGET", defaults.daily_budget)?,
                monthly_budget: parse_env("LLM_MONTHLY_BUDGET", defaults.monthly_budget)?,
                per_user_daily_cap: parse_env(
                    "LLM_PER_USER_DAILY_CAP",
                    defaults.per_user_daily_cap,
                )?,
                alert_threshold: parse_env(
                    "LLM_BUDGET_ALERT_THRESHOLD",
                    defaults.alert_threshold,
                )?,
            },
            breaker: BreakerSettings {
                failure_threshold: parse_env(
                    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                    breaker_defaults.failure_threshold,
                )?,
                timeout: Duration::seconds(parse_secs_env(
                    "CIRCUIT_BREAKER_TIMEOUT_SECS",
                    breaker_defaults.timeout.num_seconds() as u64,
                    MAX_BREAKER_TIMEOUT_SECS,
                )? as i64),
            },
            request_timeout: std::time::Duration::from_secs(parse_secs_env(
                "LLM_REQUEST_TIMEOUT_SECS",
                120,
                MAX_REQUEST_TIMEOUT_SECS,
            )?),
            metrics_retention_days: parse_env("METRICS_RETENTION_DAYS", 90)?,
        })
    }

    /// Built-in strategy table, or the JSON file at `LLM_STRATEGY_TABLE_PATH`.
    pub fn load_strategy_table(&self) -> Result<StrategyTable> {
        match &self.strategy_table_path {
            None => Ok(StrategyTable::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read strategy table {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid strategy table {}", path.display()))
            }
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
    }
}

/// A duration in whole seconds, between 1 and `max`.
fn parse_secs_env(key: &str, default: u64, max: u64) -> Result<u64> {
    let secs: u64 = parse_env(key, default)?;
    if !(1..=max).contains(&secs) {
        bail!("Environment variable '{key}' must be between 1 and {max} seconds, got {secs}");
    }
    Ok(secs)
}
