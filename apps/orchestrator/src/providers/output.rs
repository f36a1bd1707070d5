//! Structural validation of provider output and the derived quality score.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::ProviderContent;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct MalformedOutput(pub String);

/// Validated task output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskContent {
    Json(Value),
    Embeddings(Vec<Vec<f32>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput {
    pub content: TaskContent,
    /// Fraction of required fields present. `None` when nothing was required.
    pub quality_score: Option<f64>,
}

/// Chat output must be a JSON object or array.
pub fn validate_json(
    content: &ProviderContent,
    required_fields: &[String],
) -> Result<ValidatedOutput, MalformedOutput> {
    let ProviderContent::Text(text) = content else {
        return Err(MalformedOutput("expected text, got embeddings".to_string()));
    };
    let body = json_body(text);
    if body.is_empty() {
        return Err(MalformedOutput("empty response".to_string()));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| MalformedOutput(format!("response is not valid JSON: {e}")))?;
    if !(value.is_object() || value.is_array()) {
        return Err(MalformedOutput(
            "response must be a JSON object or array".to_string(),
        ));
    }

    let quality_score = quality_score(&value, required_fields);
    Ok(ValidatedOutput {
        content: TaskContent::Json(value),
        quality_score,
    })
}

/// The payload of a chat reply. Models often wrap JSON in a markdown block
/// whose opening line carries a language tag (`json`, `JSON`, or none).
fn json_body(reply: &str) -> &str {
    let reply = reply.trim();
    let Some(fenced) = reply.strip_prefix("```") else {
        return reply;
    };
    let after_tag = match fenced.split_once('\n') {
        Some((tag, rest)) if !tag.trim_start().starts_with(['{', '[']) => rest,
        _ => fenced,
    };
    after_tag
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(after_tag)
        .trim()
}

/// One non-empty vector per input text, all of the same dimension.
pub fn validate_embeddings(
    content: &ProviderContent,
    expected: usize,
) -> Result<ValidatedOutput, MalformedOutput> {
    let ProviderContent::Embeddings(vectors) = content else {
        return Err(MalformedOutput("expected embeddings, got text".to_string()));
    };
    if vectors.len() != expected {
        return Err(MalformedOutput(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if dimension == 0 {
        return Err(MalformedOutput("empty embedding vector".to_string()));
    }
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(MalformedOutput("embedding dimensions differ".to_string()));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(MalformedOutput("embedding contains non-finite values".to_string()));
    }
    Ok(ValidatedOutput {
        content: TaskContent::Embeddings(vectors.clone()),
        quality_score: None,
    })
}

/// Fraction of `required` top-level fields that are present and non-empty.
/// For an array, the first element is inspected.
fn quality_score(value: &Value, required: &[String]) -> Option<f64> {
    if required.is_empty() {
        return None;
    }
    let object = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
    .and_then(Value::as_object);

    let present = required
        .iter()
        .filter(|field| {
            object
                .and_then(|o| o.get(field.as_str()))
                .is_some_and(|v| match v {
                    Value::Null => false,
                    Value::String(s) => !s.trim().is_empty(),
                    Value::Array(a) => !a.is_empty(),
                    _ => true,
                })
        })
        .count();
    Some(present as f64 / required.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ProviderContent {
        ProviderContent::Text(s.to_string())
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_json_body_unwraps_tagged_and_bare_blocks() {
        let parsed_job = r#"{"title": "Office manager"}"#;
        assert_eq!(json_body(&format!("```json\n{parsed_job}\n```")), parsed_job);
        assert_eq!(json_body(&format!("```JSON\n{parsed_job}\n```\n")), parsed_job);
        assert_eq!(json_body(&format!("```\n{parsed_job}\n```")), parsed_job);
        assert_eq!(json_body(&format!("```{parsed_job}```")), parsed_job);
        assert_eq!(json_body(&format!("  {parsed_job}  ")), parsed_job);
    }

    #[test]
    fn test_unterminated_block_still_yields_body() {
        assert_eq!(json_body("```json\n[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_fenced_json_validates() {
        let out = validate_json(&text("```json\n{\"title\": \"Engineer\"}\n```"), &[]).unwrap();
        assert_eq!(out.content, TaskContent::Json(serde_json::json!({"title": "Engineer"})));
        assert_eq!(out.quality_score, None);
    }

    #[test]
    fn test_prose_is_malformed() {
        assert!(validate_json(&text("Sure! Here is your CV."), &[]).is_err());
        assert!(validate_json(&text("   "), &[]).is_err());
        assert!(validate_json(&text("42"), &[]).is_err());
    }

    #[test]
    fn test_quality_is_fraction_of_required_fields() {
        let out = validate_json(
            &text(r#"{"title": "Engineer", "skills": [], "summary": "", "company": "Acme"}"#),
            &fields(&["title", "skills", "summary", "company"]),
        )
        .unwrap();
        assert_eq!(out.quality_score, Some(0.5));
    }

    #[test]
    fn test_embeddings_validation() {
        let good = ProviderContent::Embeddings(vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert!(validate_embeddings(&good, 2).is_ok());
        assert!(validate_embeddings(&good, 3).is_err());

        let ragged = ProviderContent::Embeddings(vec![vec![0.1, 0.2], vec![0.3]]);
        assert!(validate_embeddings(&ragged, 2).is_err());

        let empty = ProviderContent::Embeddings(vec![vec![]]);
        assert!(validate_embeddings(&empty, 1).is_err());

        assert!(validate_embeddings(&text("[]"), 1).is_err());
    }
}
