//! Pure aggregation over recorded metrics. No storage access here.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::metrics::PerformanceMetric;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelPerformanceSummary {
    pub model_name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: f64,
    /// Mean over all attempts, failed ones included.
    pub avg_processing_time_ms: f64,
    /// Mean over successful attempts only.
    pub avg_cost: f64,
    pub total_cost: f64,
    pub total_tokens: i64,
    /// Mean over attempts that carried a quality score.
    pub avg_quality_score: Option<f64>,
    pub fallback_count: u64,
    pub task_breakdown: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Speed,
    Quality,
    Cost,
    Balanced,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Speed => "speed",
            Priority::Quality => "quality",
            Priority::Cost => "cost",
            Priority::Balanced => "balanced",
        })
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speed" => Ok(Priority::Speed),
            "quality" => Ok(Priority::Quality),
            "cost" => Ok(Priority::Cost),
            "balanced" => Ok(Priority::Balanced),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Default)]
struct Accumulator {
    total: u64,
    successes: u64,
    latency_sum: f64,
    success_cost_sum: f64,
    total_cost: f64,
    total_tokens: i64,
    quality_sum: f64,
    quality_count: u64,
    fallbacks: u64,
    tasks: BTreeMap<String, u64>,
}

/// Per-model aggregates, ordered by model name.
pub fn summarize(metrics: &[PerformanceMetric]) -> Vec<ModelPerformanceSummary> {
    let mut by_model: HashMap<&str, Accumulator> = HashMap::new();

    for metric in metrics {
        let acc = by_model.entry(metric.model_name.as_str()).or_default();
        acc.total += 1;
        acc.latency_sum += metric.processing_time_ms as f64;
        acc.total_cost += metric.cost;
        acc.total_tokens += metric.tokens_used;
        if metric.success {
            acc.successes += 1;
            acc.success_cost_sum += metric.cost;
        }
        if let Some(q) = metric.quality_score {
            acc.quality_sum += q;
            acc.quality_count += 1;
        }
        if metric.fallback_used {
            acc.fallbacks += 1;
        }
        *acc.tasks.entry(metric.task_type.clone()).or_insert(0) += 1;
    }

    let mut summaries: Vec<ModelPerformanceSummary> = by_model
        .into_iter()
        .map(|(model, acc)| ModelPerformanceSummary {
            model_name: model.to_string(),
            total_requests: acc.total,
            successful_requests: acc.successes,
            success_rate: acc.successes as f64 / acc.total as f64,
            avg_processing_time_ms: acc.latency_sum / acc.total as f64,
            avg_cost: if acc.successes > 0 {
                acc.success_cost_sum / acc.successes as f64
            } else {
                0.0
            },
            total_cost: acc.total_cost,
            total_tokens: acc.total_tokens,
            avg_quality_score: (acc.quality_count > 0)
                .then(|| acc.quality_sum / acc.quality_count as f64),
            fallback_count: acc.fallbacks,
            task_breakdown: acc.tasks,
        })
        .collect();

    summaries.sort_by(|a, b| a.model_name.cmp(&b.model_name));
    summaries
}

/// Picks the model whose history for `task_type` ranks best on `priority`.
/// Models with no successful attempt are never chosen. Ties go to the
/// alphabetically first model.
pub fn best_model(
    metrics: &[PerformanceMetric],
    task_type: &str,
    priority: Priority,
) -> Option<String> {
    let relevant: Vec<PerformanceMetric> = metrics
        .iter()
        .filter(|m| m.task_type == task_type)
        .cloned()
        .collect();
    let candidates: Vec<ModelPerformanceSummary> = summarize(&relevant)
        .into_iter()
        .filter(|s| s.successful_requests > 0)
        .collect();

    let max_latency = candidates
        .iter()
        .map(|s| s.avg_processing_time_ms)
        .fold(0.0_f64, f64::max);
    let max_cost = candidates.iter().map(|s| s.avg_cost).fold(0.0_f64, f64::max);

    // Higher is better on every axis.
    let score = |s: &ModelPerformanceSummary| -> f64 {
        match priority {
            Priority::Speed => -s.avg_processing_time_ms,
            Priority::Cost => -s.avg_cost,
            Priority::Quality => s.avg_quality_score.unwrap_or(0.0) + s.success_rate * 1e-3,
            Priority::Balanced => {
                let speed = if max_latency > 0.0 {
                    1.0 - s.avg_processing_time_ms / max_latency
                } else {
                    1.0
                };
                let cheapness = if max_cost > 0.0 {
                    1.0 - s.avg_cost / max_cost
                } else {
                    1.0
                };
                0.4 * s.avg_quality_score.unwrap_or(0.0)
                    + 0.3 * s.success_rate
                    + 0.15 * speed
                    + 0.15 * cheapness
            }
        }
    };

    let mut best: Option<(&ModelPerformanceSummary, f64)> = None;
    for candidate in &candidates {
        let candidate_score = score(candidate);
        if best.map_or(true, |(_, s)| candidate_score > s) {
            best = Some((candidate, candidate_score));
        }
    }
    best.map(|(s, _)| s.model_name.clone())
}
