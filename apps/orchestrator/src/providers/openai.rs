/// OpenAI adapter: chat completions and embeddings.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    LlmProvider, ProviderContent, ProviderError, ProviderErrorKind, ProviderInput, ProviderRequest,
    ProviderResponse, TokenUsage,
};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: EmbeddingUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        model: &str,
        body: &T,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!("OpenAI API returned {} for {}: {}", status, model, text);
            let message = serde_json::from_str::<OpenAiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.clone());
            return Err(ProviderError::from_status(status.as_u16(), message, &text));
        }
        Ok(text)
    }
}

/// gpt-5 models reject any temperature other than the default.
fn temperature_for(model: &str, temperature: f32) -> Option<f32> {
    (!model.starts_with("gpt-5")).then_some(temperature)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn supports(&self, model: &str) -> bool {
        model.starts_with("gpt-") || model.starts_with("text-embedding-")
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let response = match &request.input {
            ProviderInput::Chat { system, prompt } => {
                let body = ChatRequest {
                    model: &request.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system,
                        },
                        ChatMessage {
                            role: "user",
                            content: prompt,
                        },
                    ],
                    max_completion_tokens: request.max_tokens,
                    temperature: temperature_for(&request.model, request.temperature),
                };
                let text = self.post("/chat/completions", &request.model, &body).await?;
                parse_chat_response(&text)?
            }
            ProviderInput::Embedding { texts } => {
                let body = EmbeddingRequest {
                    model: &request.model,
                    input: texts,
                };
                let text = self.post("/embeddings", &request.model, &body).await?;
                parse_embedding_response(&text)?
            }
        };

        debug!(
            "OpenAI call succeeded: model={}, input_tokens={}, output_tokens={}",
            request.model, response.usage.input_tokens, response.usage.output_tokens
        );
        Ok(response)
    }
}

fn unreadable(e: serde_json::Error) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::Unknown,
        format!("unreadable OpenAI response: {e}"),
    )
}

fn parse_chat_response(body: &str) -> Result<ProviderResponse, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(unreadable)?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    Ok(ProviderResponse {
        content: ProviderContent::Text(text),
        usage: TokenUsage {
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        },
    })
}

fn parse_embedding_response(body: &str) -> Result<ProviderResponse, ProviderError> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body).map_err(unreadable)?;
    parsed.data.sort_by_key(|d| d.index);
    Ok(ProviderResponse {
        content: ProviderContent::Embeddings(
            parsed.data.into_iter().map(|d| d.embedding).collect(),
        ),
        usage: TokenUsage {
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: 0,
        },
    })
}
