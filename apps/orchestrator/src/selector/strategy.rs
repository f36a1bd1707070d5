//! Strategy table: named bundles of per-task default and fallback models.
//!
//! The built-in table can be replaced wholesale by a JSON file of the same shape
//! (see `Config::load_strategy_table`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::{ModelRegistry, RegistryError};
use crate::task::TaskType;

pub const COST_OPTIMIZED: &str = "cost_optimized";
pub const BALANCED: &str = "balanced";
pub const QUALITY_OPTIMIZED: &str = "quality_optimized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskModels {
    pub default: String,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Simple inputs go to the cheapest model of the task's modality.
    #[serde(default)]
    pub downgrade_simple_tasks: bool,
    pub tasks: BTreeMap<TaskType, TaskModels>,
}

impl StrategyConfig {
    pub fn models_for(&self, task_type: TaskType) -> Option<&TaskModels> {
        self.tasks.get(&task_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyTable {
    strategies: BTreeMap<String, StrategyConfig>,
}

impl StrategyTable {
    pub fn get(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Every strategy must cover every task type with models the registry knows,
    /// of the right modality.
    pub fn validate(&self, registry: &ModelRegistry) -> Result<(), RegistryError> {
        for (name, strategy) in &self.strategies {
            for task_type in TaskType::all() {
                let models = strategy.models_for(task_type).ok_or_else(|| {
                    RegistryError::Invalid(format!(
                        "strategy '{name}' has no entry for {task_type}"
                    ))
                })?;
                for model in [&models.default, &models.fallback] {
                    let config = registry.get_model_config(model)?;
                    if config.modality() != task_type.modality() {
                        return Err(RegistryError::Invalid(format!(
                            "strategy '{name}' maps {task_type} to {model} \
                             of the wrong modality"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn entry(default: &str, fallback: &str) -> TaskModels {
    TaskModels {
        default: default.to_string(),
        fallback: fallback.to_string(),
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        let mut strategies = BTreeMap::new();

        strategies.insert(
            COST_OPTIMIZED.to_string(),
            StrategyConfig {
                downgrade_simple_tasks: true,
                tasks: BTreeMap::from([
                    (TaskType::JobParsing, entry("gpt-4o-mini", "claude-3-5-haiku")),
                    (TaskType::DocumentParsing, entry("gpt-4o-mini", "claude-3-5-haiku")),
                    (TaskType::CvGeneration, entry("gpt-4o-mini", "claude-3-5-haiku")),
                    (
                        TaskType::Embedding,
                        entry("text-embedding-3-small", "text-embedding-3-large"),
                    ),
                ]),
            },
        );

        strategies.insert(
            BALANCED.to_string(),
            StrategyConfig {
                downgrade_simple_tasks: false,
                tasks: BTreeMap::from([
                    (TaskType::JobParsing, entry("gpt-4o-mini", "claude-3-5-haiku")),
                    (TaskType::DocumentParsing, entry("gpt-4o-mini", "claude-3-5-haiku")),
                    (TaskType::CvGeneration, entry("gpt-4o", "claude-sonnet-4")),
                    (
                        TaskType::Embedding,
                        entry("text-embedding-3-small", "text-embedding-3-large"),
                    ),
                ]),
            },
        );

        strategies.insert(
            QUALITY_OPTIMIZED.to_string(),
            StrategyConfig {
                downgrade_simple_tasks: false,
                tasks: BTreeMap::from([
                    (TaskType::JobParsing, entry("gpt-4o", "claude-sonnet-4")),
                    (TaskType::DocumentParsing, entry("claude-sonnet-4", "gpt-4o")),
                    (TaskType::CvGeneration, entry("claude-opus-4", "gpt-5")),
                    (
                        TaskType::Embedding,
                        entry("text-embedding-3-large", "text-embedding-3-small"),
                    ),
                ]),
            },
        );

        Self { strategies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = StrategyTable::default();
        assert!(table.validate(&ModelRegistry::builtin()).is_ok());
        assert_eq!(
            table.names().collect::<Vec<_>>(),
            vec![BALANCED, COST_OPTIMIZED, QUALITY_OPTIMIZED]
        );
    }

    #[test]
    fn test_table_loads_from_json() {
        let raw = r#"{
            "tiny": {
                "downgrade_simple_tasks": true,
                "tasks": {
                    "job_parsing": { "default": "gpt-4o-mini", "fallback": "claude-3-5-haiku" },
                    "document_parsing": { "default": "gpt-4o-mini", "fallback": "claude-3-5-haiku" },
                    "cv_generation": { "default": "gpt-4o-mini", "fallback": "claude-3-5-haiku" },
                    "embedding": { "default": "text-embedding-3-small", "fallback": "text-embedding-3-large" }
                }
            }
        }"#;
        let table: StrategyTable = serde_json::from_str(raw).unwrap();
        let tiny = table.get("tiny").unwrap();
        assert!(tiny.downgrade_simple_tasks);
        assert_eq!(
            tiny.models_for(TaskType::CvGeneration).unwrap().default,
            "gpt-4o-mini"
        );
        assert!(table.validate(&ModelRegistry::builtin()).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_modality() {
        let mut table = StrategyTable::default();
        if let Some(balanced) = table.strategies.get_mut(BALANCED) {
            balanced
                .tasks
                .insert(TaskType::Embedding, entry("gpt-4o", "text-embedding-3-large"));
        }
        assert!(matches!(
            table.validate(&ModelRegistry::builtin()),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let mut table = StrategyTable::default();
        if let Some(balanced) = table.strategies.get_mut(BALANCED) {
            balanced
                .tasks
                .insert(TaskType::JobParsing, entry("gpt-17", "gpt-4o-mini"));
        }
        assert_eq!(
            table.validate(&ModelRegistry::builtin()),
            Err(RegistryError::ModelNotFound("gpt-17".to_string()))
        );
    }
}
