//! Provider adapter layer: the single seam between the orchestrator and vendor APIs.
//!
//! Adapters never retry. Every vendor failure is normalized into a
//! `ProviderErrorKind` here so the orchestrator (and the circuit breakers) see
//! one closed error set regardless of vendor.

pub mod anthropic;
pub mod openai;
pub mod output;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{ModelRegistry, Provider};

// ────────────────────────────────────────────────────────────────────────────
// Request / response
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderInput {
    Chat { system: String, prompt: String },
    Embedding { texts: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub input: ProviderInput,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderContent {
    Text(String),
    Embeddings(Vec<Vec<f32>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: ProviderContent,
    pub usage: TokenUsage,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimit,
    Auth,
    Permission,
    Connection,
    BadRequest,
    ServerError,
    QuotaExceeded,
    Unknown,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::Permission => "permission",
            ProviderErrorKind::Connection => "connection",
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::ServerError => "server_error",
            ProviderErrorKind::QuotaExceeded => "quota_exceeded",
            ProviderErrorKind::Unknown => "unknown",
        }
    }

    /// Caller faults are the only failures that do not count against a model.
    pub fn counts_against_breaker(&self) -> bool {
        *self != ProviderErrorKind::BadRequest
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind} error from provider: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>, body: &str) -> Self {
        Self {
            kind: classify_status(status, body),
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() {
            ProviderErrorKind::Connection
        } else if let Some(status) = e.status() {
            classify_status(status.as_u16(), "")
        } else {
            ProviderErrorKind::Unknown
        };
        Self {
            kind,
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Maps an HTTP status (and, for 429, the body) onto the shared error set.
pub fn classify_status(status: u16, body: &str) -> ProviderErrorKind {
    match status {
        400 | 404 | 413 | 422 => ProviderErrorKind::BadRequest,
        401 => ProviderErrorKind::Auth,
        402 => ProviderErrorKind::QuotaExceeded,
        403 => ProviderErrorKind::Permission,
        408 => ProviderErrorKind::Connection,
        429 if body.contains("insufficient_quota") => ProviderErrorKind::QuotaExceeded,
        429 => ProviderErrorKind::RateLimit,
        500..=599 => ProviderErrorKind::ServerError,
        _ => ProviderErrorKind::Unknown,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider trait + router
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Whether a call to `model` can be dispatched at all.
    fn supports(&self, _model: &str) -> bool {
        true
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// Dispatches each request to the adapter of the model's registry provider.
pub struct ProviderRouter {
    registry: Arc<ModelRegistry>,
    providers: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            providers: HashMap::new(),
        }
    }

    pub fn register(mut self, provider: Provider, adapter: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider, adapter);
        self
    }

    pub fn registered(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.providers.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    fn adapter_for(&self, model: &str) -> Result<&Arc<dyn LlmProvider>, ProviderError> {
        let config = self
            .registry
            .get_model_config(model)
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadRequest, e.to_string()))?;
        self.providers.get(&config.provider).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Auth,
                format!("no API key configured for {}", config.provider),
            )
        })
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    fn supports(&self, model: &str) -> bool {
        self.adapter_for(model).is_ok_and(|adapter| adapter.supports(model))
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.adapter_for(&request.model)?.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: ProviderContent::Text(request.model.clone()),
                usage: TokenUsage::default(),
            })
        }
    }

    fn chat(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            input: ProviderInput::Chat {
                system: String::new(),
                prompt: "hi".to_string(),
            },
            max_tokens: 16,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(400, ""), ProviderErrorKind::BadRequest);
        assert_eq!(classify_status(401, ""), ProviderErrorKind::Auth);
        assert_eq!(classify_status(403, ""), ProviderErrorKind::Permission);
        assert_eq!(classify_status(429, "{}"), ProviderErrorKind::RateLimit);
        assert_eq!(
            classify_status(429, r#"{"error":{"code":"insufficient_quota"}}"#),
            ProviderErrorKind::QuotaExceeded
        );
        assert_eq!(classify_status(500, ""), ProviderErrorKind::ServerError);
        assert_eq!(classify_status(529, ""), ProviderErrorKind::ServerError);
        assert_eq!(classify_status(418, ""), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_only_bad_request_spares_the_breaker() {
        assert!(!ProviderErrorKind::BadRequest.counts_against_breaker());
        assert!(ProviderErrorKind::Auth.counts_against_breaker());
        assert!(ProviderErrorKind::Unknown.counts_against_breaker());
    }

    #[tokio::test]
    async fn test_router_dispatches_by_provider() {
        let router = ProviderRouter::new(Arc::new(ModelRegistry::builtin()))
            .register(Provider::OpenAi, Arc::new(EchoProvider));

        assert!(router.supports("gpt-4o"));
        assert!(!router.supports("claude-sonnet-4"));
        assert!(!router.supports("gpt-17"));

        let response = router.call(&chat("gpt-4o")).await.unwrap();
        assert_eq!(response.content, ProviderContent::Text("gpt-4o".to_string()));

        let err = router.call(&chat("claude-sonnet-4")).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);

        let err = router.call(&chat("gpt-17")).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::BadRequest);
        assert_eq!(router.registered(), vec![Provider::OpenAi]);
    }
}
