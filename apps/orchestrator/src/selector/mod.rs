//! Model Selector: picks a model per task from strategy defaults, input
//! complexity and the current budget posture.
//!
//! Everything here is pure computation over the registry and the strategy table.
//! Breaker state and provider I/O live in the orchestrator.

pub mod complexity;
pub mod context;
pub mod strategy;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BudgetConfig;
use crate::providers::ProviderErrorKind;
use crate::registry::{
    Modality, ModelConfig, ModelCriteria, ModelRegistry, QualityTier, RegistryError, Strength,
};
use crate::task::TaskType;
pub use context::SelectionContext;
use strategy::{StrategyConfig, StrategyTable, COST_OPTIMIZED};

/// At or above this score, generation work escalates to a high-tier model.
const HIGH_COMPLEXITY: f64 = 0.7;
/// Below this score, cost-optimized strategies may drop to the cheapest model.
const LOW_COMPLEXITY: f64 = 0.3;
/// Inputs this long always go to a long-context model.
const LONG_INPUT_WORDS: usize = 8000;
/// Consecutive errors after which any non-caller fault triggers a fallback.
const CONSECUTIVE_ERROR_FALLBACK: u32 = 3;

/// Budget usage thresholds, as a fraction of the daily or monthly budget.
const CONSERVE_AT: f64 = 0.6;
const RESTRICT_AT: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPosture {
    Normal,
    /// Past 60% of budget: task defaults move to the cost-optimized strategy.
    Conserve,
    /// Past 80% of budget: every task uses the cheapest model of its modality.
    Restrict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetAdjustment {
    pub posture: BudgetPosture,
    pub usage_ratio: f64,
    pub overrides: BTreeMap<TaskType, String>,
}

impl BudgetAdjustment {
    pub fn none() -> Self {
        Self {
            posture: BudgetPosture::Normal,
            usage_ratio: 0.0,
            overrides: BTreeMap::new(),
        }
    }
}

/// What the orchestrator knows about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    pub kind: ProviderErrorKind,
    /// Failures on this model since its last success, this one included.
    pub consecutive_errors: u32,
}

pub struct ModelSelector {
    registry: Arc<ModelRegistry>,
    strategies: StrategyTable,
    active_strategy: String,
    active: StrategyConfig,
    budgets: BudgetConfig,
}

impl ModelSelector {
    /// Fails when the table references unknown models or lacks the active strategy.
    pub fn new(
        registry: Arc<ModelRegistry>,
        strategies: StrategyTable,
        active_strategy: &str,
        budgets: BudgetConfig,
    ) -> Result<Self, RegistryError> {
        strategies.validate(&registry)?;
        let active = strategies.get(active_strategy).cloned().ok_or_else(|| {
            RegistryError::Invalid(format!("active strategy '{active_strategy}' is not defined"))
        })?;
        Ok(Self {
            registry,
            strategies,
            active_strategy: active_strategy.to_string(),
            active,
            budgets,
        })
    }

    pub fn active_strategy(&self) -> &str {
        &self.active_strategy
    }

    /// The named strategy, or the active one when the name is unknown.
    fn strategy(&self, name: &str) -> &StrategyConfig {
        self.strategies.get(name).unwrap_or(&self.active)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Primary selection
    // ────────────────────────────────────────────────────────────────────────

    pub fn select_model_for_task(
        &self,
        context: &SelectionContext,
        budget: &BudgetAdjustment,
    ) -> String {
        let task_type = context.task_type;
        let strategy = self.strategy(&context.strategy);
        let base = budget
            .overrides
            .get(&task_type)
            .cloned()
            .or_else(|| strategy.models_for(task_type).map(|m| m.default.clone()))
            .unwrap_or_else(|| hardcoded_default(task_type).to_string());

        if task_type.modality() == Modality::Embedding
            || budget.posture == BudgetPosture::Restrict
        {
            return base;
        }

        let base_config = self.registry.get_model_config(&base).ok();

        if let Some(model) = self.long_context_escalation(context, base_config) {
            debug!("Escalating {} to {} for a long input", task_type, model.name);
            return model.name.clone();
        }

        if budget.posture == BudgetPosture::Normal
            && context.complexity_score >= HIGH_COMPLEXITY
            && base_config.map_or(true, |c| c.quality_tier.rank() < QualityTier::High.rank())
        {
            if let Some(model) = self.high_quality_escalation(context) {
                debug!(
                    "Escalating {} to {} (complexity {:.2})",
                    task_type, model.name, context.complexity_score
                );
                return model.name.clone();
            }
        }

        if strategy.downgrade_simple_tasks && context.complexity_score < LOW_COMPLEXITY {
            if let Some(cheapest) = self.registry.cheapest_model(Modality::Chat) {
                return cheapest.name.clone();
            }
        }

        base
    }

    fn long_context_escalation(
        &self,
        context: &SelectionContext,
        base: Option<&ModelConfig>,
    ) -> Option<&ModelConfig> {
        // Leave room for an output of similar size.
        let needed = context.estimated_input_tokens() * 2;
        let base_fits = base.is_some_and(|c| u64::from(c.context_window) >= needed);
        if base_fits && context.word_count < LONG_INPUT_WORDS {
            return None;
        }

        let criteria = ModelCriteria {
            min_quality_tier: Some(QualityTier::High),
            required_strengths: vec![Strength::LongContext],
            ..Default::default()
        };
        cheapest(
            self.registry
                .get_models_by_criteria(&criteria)
                .into_iter()
                .filter(|m| m.modality() == Modality::Chat)
                .filter(|m| u64::from(m.context_window) >= needed),
        )
    }

    fn high_quality_escalation(&self, context: &SelectionContext) -> Option<&ModelConfig> {
        let mut required_strengths = Vec::new();
        if context.task_type == TaskType::CvGeneration {
            required_strengths.push(Strength::CreativeWriting);
        }
        if context.international {
            required_strengths.push(Strength::Multilingual);
        }
        let criteria = ModelCriteria {
            min_quality_tier: Some(QualityTier::High),
            required_strengths,
            ..Default::default()
        };
        cheapest(
            self.registry
                .get_models_by_criteria(&criteria)
                .into_iter()
                .filter(|m| m.modality() == Modality::Chat),
        )
    }

    /// Deterministic audit line. Not used for decisions.
    pub fn get_selection_reason(&self, model: &str, context: &SelectionContext) -> String {
        let strengths = self
            .registry
            .get_model_config(model)
            .map(|c| {
                let mut names: Vec<&str> = c.strengths.iter().map(Strength::as_str).collect();
                names.sort_unstable();
                names.join(",")
            })
            .unwrap_or_default();

        format!(
            "strategy={}; task={}; complexity={:.2} ({}); items={} ({}); model={}; \
             strengths=[{}]; fallback_attempt={}",
            context.strategy,
            context.task_type,
            context.complexity_score,
            context.complexity_bucket(),
            context.item_count,
            context.item_bucket(),
            model,
            strengths,
            context.fallback_attempt
        )
    }

    // ────────────────────────────────────────────────────────────────────────
    // Fallback
    // ────────────────────────────────────────────────────────────────────────

    /// Substitutes for `failed`, best first: the registry chain, then the
    /// strategy fallback, then the strategy default, then a hardcoded default.
    /// Deprecated models, models of another modality and `failed` itself are excluded.
    pub fn fallback_candidates(
        &self,
        failed: &str,
        task_type: TaskType,
        strategy: &str,
    ) -> Vec<String> {
        let models = self.strategy(strategy).models_for(task_type);

        let mut candidates: Vec<String> = Vec::new();
        let ordered = self
            .registry
            .fallback_chain(failed)
            .into_iter()
            .map(str::to_string)
            .chain(models.map(|m| m.fallback.clone()))
            .chain(models.map(|m| m.default.clone()))
            .chain(std::iter::once(hardcoded_default(task_type).to_string()));

        for name in ordered {
            let usable = name != failed
                && self.registry.get_model_config(&name).is_ok_and(|c| {
                    !c.deprecated && c.modality() == task_type.modality()
                });
            if usable && !candidates.contains(&name) {
                candidates.push(name);
            }
        }
        candidates
    }

    pub fn get_fallback_model(&self, failed: &str, task_type: TaskType) -> Option<String> {
        self.fallback_candidates(failed, task_type, &self.active_strategy)
            .into_iter()
            .next()
    }

    /// Caller faults never fall back. Transient, auth and quota failures always
    /// do. Anything else falls back once it has repeated enough.
    pub fn should_use_fallback(&self, model: &str, error: &ErrorContext) -> bool {
        let decision = match error.kind {
            ProviderErrorKind::BadRequest => false,
            ProviderErrorKind::RateLimit
            | ProviderErrorKind::Connection
            | ProviderErrorKind::ServerError
            | ProviderErrorKind::Auth
            | ProviderErrorKind::QuotaExceeded => true,
            ProviderErrorKind::Permission | ProviderErrorKind::Unknown => {
                error.consecutive_errors >= CONSECUTIVE_ERROR_FALLBACK
            }
        };
        debug!(
            "Fallback decision for {model}: {decision} ({:?}, {} consecutive)",
            error.kind, error.consecutive_errors
        );
        decision
    }

    // ────────────────────────────────────────────────────────────────────────
    // Budget
    // ────────────────────────────────────────────────────────────────────────

    /// Task defaults to use given current global spend.
    pub fn optimize_for_budget(&self, daily_spent: f64, monthly_spent: f64) -> BudgetAdjustment {
        let ratio = |spent: f64, budget: f64| if budget > 0.0 { spent / budget } else { 0.0 };
        let usage_ratio = ratio(daily_spent, self.budgets.daily_budget)
            .max(ratio(monthly_spent, self.budgets.monthly_budget));

        let posture = if usage_ratio >= RESTRICT_AT {
            BudgetPosture::Restrict
        } else if usage_ratio >= CONSERVE_AT {
            BudgetPosture::Conserve
        } else {
            BudgetPosture::Normal
        };

        let mut overrides = BTreeMap::new();
        for task_type in TaskType::all() {
            let cheapest = self
                .registry
                .cheapest_model(task_type.modality())
                .map(|m| m.name.clone());
            let model = match posture {
                BudgetPosture::Normal => None,
                BudgetPosture::Conserve => self
                    .strategies
                    .get(COST_OPTIMIZED)
                    .and_then(|s| s.models_for(task_type))
                    .map(|m| m.default.clone())
                    .or(cheapest),
                BudgetPosture::Restrict => cheapest,
            };
            if let Some(model) = model {
                overrides.insert(task_type, model);
            }
        }

        if posture != BudgetPosture::Normal {
            warn!(
                "LLM spend at {:.0}% of budget (daily ${:.2}, monthly ${:.2}); posture {:?}",
                usage_ratio * 100.0,
                daily_spent,
                monthly_spent,
                posture
            );
        }

        BudgetAdjustment {
            posture,
            usage_ratio,
            overrides,
        }
    }
}

/// Last-resort model per task when the strategy table has nothing usable.
fn hardcoded_default(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Embedding => "text-embedding-3-small",
        _ => "gpt-4o-mini",
    }
}

fn cheapest<'a>(models: impl Iterator<Item = &'a ModelConfig>) -> Option<&'a ModelConfig> {
    models.min_by(|a, b| {
        a.blended_cost()
            .partial_cmp(&b.blended_cost())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{GenerationPreferences, TaskInput};
    use strategy::{BALANCED, QUALITY_OPTIMIZED};

    fn selector(strategy: &str) -> ModelSelector {
        ModelSelector::new(
            Arc::new(ModelRegistry::builtin()),
            StrategyTable::default(),
            strategy,
            BudgetConfig::default(),
        )
        .unwrap()
    }

    fn cv_input(job: &str, creative: bool, detailed: bool) -> TaskInput {
        TaskInput::cv_generation(
            job,
            vec!["Shipped a payments platform".into()],
            GenerationPreferences {
                creative,
                detailed,
                target_locale: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_active_strategy_rejected() {
        let result = ModelSelector::new(
            Arc::new(ModelRegistry::builtin()),
            StrategyTable::default(),
            "yolo",
            BudgetConfig::default(),
        );
        assert!(matches!(result, Err(RegistryError::Invalid(_))));
    }

    #[test]
    fn test_balanced_uses_strategy_default() {
        let s = selector(BALANCED);
        let ctx = SelectionContext::from_input(&cv_input("Office manager", false, false), BALANCED);
        assert_eq!(s.select_model_for_task(&ctx, &BudgetAdjustment::none()), "gpt-4o");

        let embedding = TaskInput::embedding(vec!["a".into()]).unwrap();
        let ctx = SelectionContext::from_input(&embedding, BALANCED);
        assert_eq!(
            s.select_model_for_task(&ctx, &BudgetAdjustment::none()),
            "text-embedding-3-small"
        );
    }

    #[test]
    fn test_cost_optimized_downgrades_simple_input() {
        let s = selector(COST_OPTIMIZED);
        let ctx = SelectionContext::from_input(
            &TaskInput::job_parsing("Cashier, part time").unwrap(),
            COST_OPTIMIZED,
        );
        let cheapest = ModelRegistry::builtin()
            .cheapest_model(Modality::Chat)
            .unwrap()
            .name
            .clone();
        assert_eq!(s.select_model_for_task(&ctx, &BudgetAdjustment::none()), cheapest);
    }

    #[test]
    fn test_complex_generation_escalates() {
        let s = selector(COST_OPTIMIZED);
        let job = "Staff engineer: distributed database architecture, Rust, Kubernetes, \
                   cloud security, latency and scalability work.";
        let input = TaskInput::cv_generation(
            job,
            (0..10).map(|i| format!("Project {i}")).collect(),
            GenerationPreferences {
                creative: true,
                detailed: true,
                target_locale: None,
            },
        )
        .unwrap();
        let ctx = SelectionContext::from_input(&input, COST_OPTIMIZED);
        assert!(ctx.complexity_score >= HIGH_COMPLEXITY);

        let chosen = s.select_model_for_task(&ctx, &BudgetAdjustment::none());
        let config = ModelRegistry::builtin().get_model_config(&chosen).unwrap().clone();
        assert!(config.quality_tier.rank() >= QualityTier::High.rank());
        assert!(config.has_strength(Strength::CreativeWriting));
    }

    #[test]
    fn test_long_input_escalates_to_long_context() {
        let s = selector(BALANCED);
        let long_doc = "experience ".repeat(LONG_INPUT_WORDS);
        let ctx = SelectionContext::from_input(
            &TaskInput::document_parsing(long_doc).unwrap(),
            BALANCED,
        );
        let chosen = s.select_model_for_task(&ctx, &BudgetAdjustment::none());
        let config = ModelRegistry::builtin().get_model_config(&chosen).unwrap().clone();
        assert!(config.has_strength(Strength::LongContext));
        assert!(config.quality_tier.rank() >= QualityTier::High.rank());
    }

    #[test]
    fn test_restrict_posture_pins_cheapest() {
        let s = selector(QUALITY_OPTIMIZED);
        let adjustment = s.optimize_for_budget(45.0, 100.0);
        assert_eq!(adjustment.posture, BudgetPosture::Restrict);

        let job = "Distributed Rust architecture for cloud security and scalability";
        let ctx = SelectionContext::from_input(&cv_input(job, true, true), QUALITY_OPTIMIZED);
        assert_eq!(s.select_model_for_task(&ctx, &adjustment), "gpt-4o-mini");
    }

    #[test]
    fn test_budget_postures() {
        let s = selector(BALANCED);
        assert_eq!(s.optimize_for_budget(10.0, 100.0).posture, BudgetPosture::Normal);
        assert!(s.optimize_for_budget(10.0, 100.0).overrides.is_empty());

        let conserve = s.optimize_for_budget(31.0, 100.0);
        assert_eq!(conserve.posture, BudgetPosture::Conserve);
        assert_eq!(
            conserve.overrides.get(&TaskType::CvGeneration).map(String::as_str),
            Some("gpt-4o-mini")
        );

        // Monthly spend alone can push the posture.
        assert_eq!(s.optimize_for_budget(0.0, 850.0).posture, BudgetPosture::Restrict);
    }

    #[test]
    fn test_selection_reason_is_deterministic() {
        let s = selector(BALANCED);
        let ctx = SelectionContext::from_input(&cv_input("Rust developer", false, false), BALANCED);
        let first = s.get_selection_reason("gpt-4o", &ctx);
        assert_eq!(first, s.get_selection_reason("gpt-4o", &ctx));
        assert!(first.contains("strategy=balanced"));
        assert!(first.contains("model=gpt-4o"));
        assert!(first.contains("creative_writing"));
    }

    #[test]
    fn test_fallback_prefers_registry_chain() {
        let s = selector(BALANCED);
        assert_eq!(
            s.get_fallback_model("gpt-4o", TaskType::CvGeneration).as_deref(),
            Some("gpt-4o-mini")
        );
    }

    #[test]
    fn test_fallback_never_returns_deprecated() {
        let s = selector(BALANCED);
        // gpt-4o-mini is followed only by the deprecated gpt-3.5-turbo.
        let fallback = s.get_fallback_model("gpt-4o-mini", TaskType::JobParsing).unwrap();
        assert_eq!(fallback, "claude-3-5-haiku");
        for candidate in s.fallback_candidates("gpt-4o-mini", TaskType::JobParsing, BALANCED) {
            let config = ModelRegistry::builtin().get_model_config(&candidate).unwrap().clone();
            assert!(!config.deprecated);
            assert_ne!(candidate, "gpt-4o-mini");
        }
    }

    #[test]
    fn test_embedding_fallback_stays_in_modality() {
        let s = selector(BALANCED);
        let candidates =
            s.fallback_candidates("text-embedding-3-small", TaskType::Embedding, BALANCED);
        assert_eq!(candidates, vec!["text-embedding-3-large".to_string()]);
    }

    #[test]
    fn test_should_use_fallback() {
        let s = selector(BALANCED);
        let ctx = |kind, consecutive_errors| ErrorContext {
            kind,
            consecutive_errors,
        };
        assert!(!s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::BadRequest, 1)));
        assert!(!s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::BadRequest, 50)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::RateLimit, 1)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::Connection, 1)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::Auth, 1)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::QuotaExceeded, 1)));
        assert!(!s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::Unknown, 2)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::Unknown, 3)));
        assert!(s.should_use_fallback("gpt-4o", &ctx(ProviderErrorKind::Permission, 3)));
    }
}
