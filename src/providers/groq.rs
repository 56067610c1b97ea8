use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::llm_manager::{ChatMessage, Completion, CompletionRequest, LLMProvider};

/// Groq chat completions provider.
///
/// Speaks the OpenAI-compatible `/chat/completions` protocol, so any service
/// exposing it can be used by pointing `base_url` elsewhere.
pub struct GroqProvider {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl GroqProvider {
    /// Build a provider from configuration; the API key comes from the environment.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: config.name.clone(),
            api_key: config.api_key(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    #[allow(dead_code)]
    pub fn with_config(api_key: String, model: String) -> Self {
        let defaults = ProviderConfig::default();
        Self {
            name: defaults.name,
            api_key,
            model,
            base_url: defaults.base_url,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            client: Client::new(),
        }
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(self.temperature),
        }
    }

    fn parse_response(&self, body: &str) -> Result<Completion> {
        let response: ChatResponse = serde_json::from_str(body)
            .with_context(|| format!("Failed to parse {} response", self.name))?;

        let Some(choice) = response.choices.into_iter().next() else {
            warn!("{} returned no choices", self.name);
            return Ok(Completion::default());
        };

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(
                "{} response was truncated by the max_tokens limit ({}). Response may be incomplete.",
                self.name, self.max_tokens
            );
        }

        let total_tokens = response.usage.map(|usage| {
            info!(
                "{} token usage - Prompt: {}, Completion: {}, Total: {}",
                self.name, usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
            usage.total_tokens
        });

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            total_tokens,
        })
    }

    fn api_error(&self, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(error_response) => anyhow!(
                "{} API error ({}): {} (type: {}, code: {})",
                self.name,
                status,
                error_response.error.message,
                error_response.error.error_type.as_deref().unwrap_or("unknown"),
                error_response.error.code.as_deref().unwrap_or("none")
            ),
            Err(_) => anyhow!("{} API error (status {}): {}", self.name, status, body),
        }
    }
}

#[async_trait]
impl LLMProvider for GroqProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = self.build_request(request);

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        let response = http
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.name))?;

        let status = response.status();
        let response_text = response.text().await?;
        debug!("Raw {} response: {}", self.name, response_text);

        if !status.is_success() {
            return Err(self.api_error(status, &response_text));
        }

        self.parse_response(&response_text)
    }
}
