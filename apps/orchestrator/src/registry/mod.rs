//! Model Registry: immutable catalog of provider models.
//!
//! Built once at startup and shared as `Arc<ModelRegistry>`. Every lookup is a
//! pure function of the catalog: no I/O, no interior mutability.

mod catalog;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown model: {0}")]
    ModelNotFound(String),

    #[error("Invalid registry: {0}")]
    Invalid(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Catalog types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Chat,
    Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Standard,
    Medium,
    High,
    Premium,
}

impl QualityTier {
    /// Ordinal used for `min_quality_tier` filtering.
    /// Standard and Medium share rank 1.
    pub fn rank(&self) -> u8 {
        match self {
            QualityTier::Standard | QualityTier::Medium => 1,
            QualityTier::High => 2,
            QualityTier::Premium => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Standard => "standard",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    StructuredOutput,
    Reasoning,
    CreativeWriting,
    LongContext,
    Speed,
    CostEffective,
    Multilingual,
    SemanticSearch,
}

impl Strength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::StructuredOutput => "structured_output",
            Strength::Reasoning => "reasoning",
            Strength::CreativeWriting => "creative_writing",
            Strength::LongContext => "long_context",
            Strength::Speed => "speed",
            Strength::CostEffective => "cost_effective",
            Strength::Multilingual => "multilingual",
            Strength::SemanticSearch => "semantic_search",
        }
    }
}

/// Per-1K-token pricing. Embeddings bill a single rate on all tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelPricing {
    Chat { cost_input: f64, cost_output: f64 },
    Embedding { cost: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: Provider,
    pub pricing: ModelPricing,
    pub context_window: u32,
    pub quality_tier: QualityTier,
    pub strengths: Vec<Strength>,
    pub deprecated: bool,
}

impl ModelConfig {
    pub fn modality(&self) -> Modality {
        match self.pricing {
            ModelPricing::Chat { .. } => Modality::Chat,
            ModelPricing::Embedding { .. } => Modality::Embedding,
        }
    }

    /// Input-side price per 1K tokens; the axis `max_cost` filters on.
    pub fn input_cost(&self) -> f64 {
        match self.pricing {
            ModelPricing::Chat { cost_input, .. } => cost_input,
            ModelPricing::Embedding { cost } => cost,
        }
    }

    /// Input + output price per 1K tokens, used to rank models by cheapness.
    pub fn blended_cost(&self) -> f64 {
        match self.pricing {
            ModelPricing::Chat {
                cost_input,
                cost_output,
            } => cost_input + cost_output,
            ModelPricing::Embedding { cost } => cost,
        }
    }

    pub fn has_strength(&self, strength: Strength) -> bool {
        self.strengths.contains(&strength)
    }
}

/// Ordered substitutes within one provider and modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackChain {
    pub provider: Provider,
    pub modality: Modality,
    pub models: Vec<String>,
}

/// Filter for `get_models_by_criteria`. `None` fields do not filter.
#[derive(Debug, Clone)]
pub struct ModelCriteria {
    pub max_cost: Option<f64>,
    pub min_quality_tier: Option<QualityTier>,
    pub required_strengths: Vec<Strength>,
    pub exclude_deprecated: bool,
}

impl Default for ModelCriteria {
    fn default() -> Self {
        Self {
            max_cost: None,
            min_quality_tier: None,
            required_strengths: Vec::new(),
            exclude_deprecated: true,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
    /// Catalog order, for deterministic listings.
    order: Vec<String>,
    chains: Vec<FallbackChain>,
}

impl ModelRegistry {
    /// The built-in OpenAI + Anthropic catalog.
    pub fn builtin() -> Self {
        // The built-in catalog is validated by tests; construction cannot fail.
        Self::build(catalog::builtin_models(), catalog::builtin_chains())
    }

    /// Builds a registry, rejecting duplicate names and chains that reference
    /// unknown models or mix providers.
    pub fn new(
        models: Vec<ModelConfig>,
        chains: Vec<FallbackChain>,
    ) -> Result<Self, RegistryError> {
        let mut seen = std::collections::HashSet::new();
        for model in &models {
            if !seen.insert(model.name.as_str()) {
                return Err(RegistryError::Invalid(format!(
                    "duplicate model '{}'",
                    model.name
                )));
            }
        }

        for chain in &chains {
            for name in &chain.models {
                let model = models
                    .iter()
                    .find(|m| &m.name == name)
                    .ok_or_else(|| RegistryError::ModelNotFound(name.clone()))?;
                if model.provider != chain.provider || model.modality() != chain.modality {
                    return Err(RegistryError::Invalid(format!(
                        "model '{name}' does not belong to the {} {:?} chain",
                        chain.provider, chain.modality
                    )));
                }
            }
        }

        Ok(Self::build(models, chains))
    }

    fn build(models: Vec<ModelConfig>, chains: Vec<FallbackChain>) -> Self {
        let order = models.iter().map(|m| m.name.clone()).collect();
        let models = models.into_iter().map(|m| (m.name.clone(), m)).collect();
        Self {
            models,
            order,
            chains,
        }
    }

    pub fn get_model_config(&self, name: &str) -> Result<&ModelConfig, RegistryError> {
        self.models
            .get(name)
            .ok_or_else(|| RegistryError::ModelNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// USD cost of a call. Embedding models bill `input + output` tokens at one rate.
    pub fn calculate_cost(
        &self,
        name: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<f64, RegistryError> {
        let config = self.get_model_config(name)?;
        let cost = match config.pricing {
            ModelPricing::Chat {
                cost_input,
                cost_output,
            } => {
                input_tokens as f64 / 1000.0 * cost_input
                    + output_tokens as f64 / 1000.0 * cost_output
            }
            ModelPricing::Embedding { cost } => {
                (input_tokens as f64 + output_tokens as f64) / 1000.0 * cost
            }
        };
        Ok(cost)
    }

    /// Next non-deprecated model after `name` in its provider chain.
    pub fn get_fallback_model(&self, name: &str) -> Option<&str> {
        self.fallback_chain(name).into_iter().next()
    }

    /// Every non-deprecated model after `name` in its chain, in order.
    pub fn fallback_chain(&self, name: &str) -> Vec<&str> {
        let Some(chain) = self.chains.iter().find(|c| c.models.iter().any(|m| m == name)) else {
            return Vec::new();
        };

        chain
            .models
            .iter()
            .skip_while(|m| m.as_str() != name)
            .skip(1)
            .filter(|m| self.models.get(m.as_str()).is_some_and(|c| !c.deprecated))
            .map(String::as_str)
            .collect()
    }

    pub fn get_models_by_criteria(&self, criteria: &ModelCriteria) -> Vec<&ModelConfig> {
        self.list_models()
            .into_iter()
            .filter(|m| !(criteria.exclude_deprecated && m.deprecated))
            .filter(|m| criteria.max_cost.map_or(true, |max| m.input_cost() <= max))
            .filter(|m| {
                criteria
                    .min_quality_tier
                    .map_or(true, |tier| m.quality_tier.rank() >= tier.rank())
            })
            .filter(|m| criteria.required_strengths.iter().all(|s| m.has_strength(*s)))
            .collect()
    }

    /// All models in catalog order.
    pub fn list_models(&self) -> Vec<&ModelConfig> {
        self.order
            .iter()
            .filter_map(|name| self.models.get(name))
            .collect()
    }

    /// Cheapest non-deprecated model of a modality by blended price.
    pub fn cheapest_model(&self, modality: Modality) -> Option<&ModelConfig> {
        self.list_models()
            .into_iter()
            .filter(|m| !m.deprecated && m.modality() == modality)
            .min_by(|a, b| {
                a.blended_cost()
                    .partial_cmp(&b.blended_cost())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
