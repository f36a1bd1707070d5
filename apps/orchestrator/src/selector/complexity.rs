//! Complexity heuristic: a 0–1 estimate of how much model capability a task needs.

/// Vocabulary that marks a job description or document as technical.
const TECHNICAL_KEYWORDS: &[&str] = &[
    "algorithm",
    "api",
    "architecture",
    "aws",
    "backend",
    "cloud",
    "compiler",
    "concurrency",
    "database",
    "devops",
    "distributed",
    "docker",
    "embedded",
    "frontend",
    "infrastructure",
    "kubernetes",
    "latency",
    "machine learning",
    "microservices",
    "python",
    "rust",
    "scalability",
    "security",
    "sql",
    "terraform",
    "typescript",
];

/// Phrases that suggest the output has to work across languages or markets.
const INTERNATIONAL_HINTS: &[&str] = &[
    "bilingual",
    "international",
    "multilingual",
    "relocation",
    "visa sponsorship",
    "worldwide",
];

/// Raw signals extracted from a task input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComplexitySignals {
    pub word_count: usize,
    pub technical_hits: usize,
    pub item_count: usize,
    pub creative: bool,
    pub detailed: bool,
    pub international: bool,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of distinct technical keywords present. Single words match whole
/// tokens; phrases match as substrings of the normalized text.
pub fn technical_hits(text: &str) -> usize {
    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    TECHNICAL_KEYWORDS
        .iter()
        .filter(|kw| {
            if kw.contains(' ') {
                normalized.contains(*kw)
            } else {
                tokens.contains(kw)
            }
        })
        .count()
}

pub fn has_international_hint(text: &str) -> bool {
    let normalized = normalize(text);
    INTERNATIONAL_HINTS.iter().any(|hint| normalized.contains(hint))
}

/// True for a BCP-47 tag whose language is not English.
pub fn is_non_english_locale(locale: &str) -> bool {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    !language.is_empty() && language != "en"
}

pub fn complexity_score(signals: &ComplexitySignals) -> f64 {
    let mut score = match signals.word_count {
        n if n >= 1000 => 0.3,
        n if n >= 500 => 0.2,
        n if n >= 200 => 0.1,
        _ => 0.0,
    };
    score += (signals.item_count as f64 * 0.03).min(0.3);
    score += (signals.technical_hits as f64 * 0.05).min(0.2);
    if signals.creative {
        score += 0.2;
    }
    if signals.detailed {
        score += 0.15;
    }
    if signals.international {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_signals_score_zero() {
        assert_eq!(complexity_score(&ComplexitySignals::default()), 0.0);
    }

    #[test]
    fn test_word_count_tiers() {
        let at = |n| complexity_score(&ComplexitySignals {
            word_count: n,
            ..Default::default()
        });
        assert_eq!(at(199), 0.0);
        assert!((at(200) - 0.1).abs() < 1e-9);
        assert!((at(500) - 0.2).abs() < 1e-9);
        assert!((at(5000) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_item_and_keyword_caps() {
        let score = complexity_score(&ComplexitySignals {
            item_count: 50,
            technical_hits: 12,
            ..Default::default()
        });
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let score = complexity_score(&ComplexitySignals {
            word_count: 2000,
            item_count: 20,
            technical_hits: 10,
            creative: true,
            detailed: true,
            international: true,
        });
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_technical_hits_are_distinct_tokens() {
        let text = "Rust backend engineer. Rust, SQL and Kubernetes; \
                    machine-learning a plus. Trusty APIs.";
        // rust, backend, sql, kubernetes, machine learning. "Trusty" and "APIs" do not match.
        assert_eq!(technical_hits(text), 5);
    }

    #[test]
    fn test_international_signals() {
        assert!(has_international_hint("Open to Relocation within the EU"));
        assert!(!has_international_hint("Remote within the US"));
        assert!(is_non_english_locale("de-DE"));
        assert!(!is_non_english_locale("en_GB"));
        assert!(!is_non_english_locale(""));
    }
}
