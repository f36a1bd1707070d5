//! Built-in model catalog. Prices are USD per 1K tokens.

use super::{FallbackChain, Modality, ModelConfig, ModelPricing, Provider, QualityTier, Strength};

fn chat(
    name: &str,
    provider: Provider,
    cost_input: f64,
    cost_output: f64,
    context_window: u32,
    quality_tier: QualityTier,
    strengths: &[Strength],
) -> ModelConfig {
    ModelConfig {
        name: name.to_string(),
        provider,
        pricing: ModelPricing::Chat {
            cost_input,
            cost_output,
        },
        context_window,
        quality_tier,
        strengths: strengths.to_vec(),
        deprecated: false,
    }
}

fn embedding(
    name: &str,
    cost: f64,
    context_window: u32,
    quality_tier: QualityTier,
    strengths: &[Strength],
) -> ModelConfig {
    ModelConfig {
        name: name.to_string(),
        provider: Provider::OpenAi,
        pricing: ModelPricing::Embedding { cost },
        context_window,
        quality_tier,
        strengths: strengths.to_vec(),
        deprecated: false,
    }
}

fn deprecated(mut config: ModelConfig) -> ModelConfig {
    config.deprecated = true;
    config
}

pub(super) fn builtin_models() -> Vec<ModelConfig> {
    use Strength::*;

    vec![
        // OpenAI chat
        chat(
            "gpt-5",
            Provider::OpenAi,
            0.00125,
            0.01,
            400_000,
            QualityTier::Premium,
            &[Reasoning, StructuredOutput, LongContext, CreativeWriting],
        ),
        chat(
            "gpt-4o",
            Provider::OpenAi,
            0.0025,
            0.01,
            128_000,
            QualityTier::High,
            &[StructuredOutput, CreativeWriting, Multilingual],
        ),
        chat(
            "gpt-4o-mini",
            Provider::OpenAi,
            0.00015,
            0.0006,
            128_000,
            QualityTier::Standard,
            &[Speed, CostEffective, StructuredOutput],
        ),
        deprecated(chat(
            "gpt-3.5-turbo",
            Provider::OpenAi,
            0.0005,
            0.0015,
            16_385,
            QualityTier::Standard,
            &[Speed],
        )),
        // Anthropic chat
        chat(
            "claude-opus-4",
            Provider::Anthropic,
            0.015,
            0.075,
            200_000,
            QualityTier::Premium,
            &[Reasoning, CreativeWriting, LongContext],
        ),
        chat(
            "claude-sonnet-4",
            Provider::Anthropic,
            0.003,
            0.015,
            200_000,
            QualityTier::High,
            &[LongContext, StructuredOutput, CreativeWriting, Multilingual],
        ),
        chat(
            "claude-3-5-haiku",
            Provider::Anthropic,
            0.0008,
            0.004,
            200_000,
            QualityTier::Medium,
            &[Speed, CostEffective, LongContext],
        ),
        // OpenAI embeddings
        embedding(
            "text-embedding-3-large",
            0.00013,
            8_191,
            QualityTier::High,
            &[SemanticSearch, Multilingual],
        ),
        embedding(
            "text-embedding-3-small",
            0.00002,
            8_191,
            QualityTier::Standard,
            &[SemanticSearch, CostEffective],
        ),
        deprecated(embedding(
            "text-embedding-ada-002",
            0.0001,
            8_191,
            QualityTier::Standard,
            &[SemanticSearch],
        )),
    ]
}

pub(super) fn builtin_chains() -> Vec<FallbackChain> {
    let chain = |provider, modality, models: &[&str]| FallbackChain {
        provider,
        modality,
        models: models.iter().map(|m| m.to_string()).collect(),
    };

    vec![
        chain(
            Provider::OpenAi,
            Modality::Chat,
            &["gpt-5", "gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"],
        ),
        chain(
            Provider::Anthropic,
            Modality::Chat,
            &["claude-opus-4", "claude-sonnet-4", "claude-3-5-haiku"],
        ),
        chain(
            Provider::OpenAi,
            Modality::Embedding,
            &[
                "text-embedding-3-large",
                "text-embedding-3-small",
                "text-embedding-ada-002",
            ],
        ),
    ]
}
