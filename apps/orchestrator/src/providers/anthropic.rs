/// Anthropic adapter: chat calls over the Messages API.
///
/// No retries here: a 429 or 5xx goes straight back to the orchestrator so
/// the model's circuit breaker sees it.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    LlmProvider, ProviderContent, ProviderError, ProviderErrorKind, ProviderInput, ProviderRequest,
    ProviderResponse, TokenUsage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    /// Concatenated text of all text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            url: ANTHROPIC_API_URL.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn supports(&self, model: &str) -> bool {
        model.starts_with("claude")
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let ProviderInput::Chat { system, prompt } = &request.input else {
            return Err(ProviderError::new(
                ProviderErrorKind::BadRequest,
                format!("{} does not serve embeddings", request.model),
            ));
        };

        let request_body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Anthropic API returned {} for {}: {}", status, request.model, body);
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());
            return Err(ProviderError::from_status(status.as_u16(), message, &body));
        }

        let body = response.text().await?;
        let parsed = parse_messages_response(&body)?;
        debug!(
            "Anthropic call succeeded: model={}, input_tokens={}, output_tokens={}",
            request.model, parsed.usage.input_tokens, parsed.usage.output_tokens
        );
        Ok(parsed)
    }
}

fn parse_messages_response(body: &str) -> Result<ProviderResponse, ProviderError> {
    let parsed: MessagesResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::Unknown,
            format!("unreadable Messages API response: {e}"),
        )
    })?;
    Ok(ProviderResponse {
        content: ProviderContent::Text(parsed.text()),
        usage: TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        },
    })
}
