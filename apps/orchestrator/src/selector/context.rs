use serde::Serialize;

use super::complexity::{
    complexity_score, has_international_hint, is_non_english_locale, technical_hits, word_count,
    ComplexitySignals,
};
use crate::task::{TaskInput, TaskType};

/// Everything the selector knows about one request. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionContext {
    pub task_type: TaskType,
    pub word_count: usize,
    pub technical_hits: usize,
    pub item_count: usize,
    pub prefers_creative: bool,
    pub prefers_detailed: bool,
    pub international: bool,
    pub complexity_score: f64,
    pub strategy: String,
    pub fallback_attempt: bool,
}

impl SelectionContext {
    pub fn from_input(input: &TaskInput, strategy: &str) -> Self {
        let text = input.primary_text();
        let (creative, detailed, locale) = match input {
            TaskInput::CvGeneration { preferences, .. } => (
                preferences.creative,
                preferences.detailed,
                preferences.target_locale.as_deref(),
            ),
            _ => (false, false, None),
        };
        let international =
            locale.is_some_and(is_non_english_locale) || has_international_hint(&text);

        let signals = ComplexitySignals {
            word_count: word_count(&text),
            technical_hits: technical_hits(&text),
            item_count: input.item_count(),
            creative,
            detailed,
            international,
        };

        Self {
            task_type: input.task_type(),
            word_count: signals.word_count,
            technical_hits: signals.technical_hits,
            item_count: signals.item_count,
            prefers_creative: creative,
            prefers_detailed: detailed,
            international,
            complexity_score: complexity_score(&signals),
            strategy: strategy.to_string(),
            fallback_attempt: false,
        }
    }

    /// Same request, marked as the single fallback attempt.
    pub fn for_fallback(&self) -> Self {
        Self {
            fallback_attempt: true,
            ..self.clone()
        }
    }

    pub fn complexity_bucket(&self) -> &'static str {
        match self.complexity_score {
            s if s >= 0.7 => "high",
            s if s >= 0.3 => "medium",
            _ => "low",
        }
    }

    pub fn item_bucket(&self) -> &'static str {
        match self.item_count {
            0 => "none",
            1..=3 => "few",
            4..=10 => "several",
            _ => "many",
        }
    }

    /// Rough token estimate of the input (about 4 tokens per 3 words).
    pub fn estimated_input_tokens(&self) -> u64 {
        (self.word_count as u64 * 4).div_ceil(3)
    }
}
