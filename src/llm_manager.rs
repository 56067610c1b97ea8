use crate::event_bus::{Event, EventBus};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role tag of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Everything needed for one completion call.
///
/// `max_tokens` and `temperature` override the provider defaults when set.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Default::default() }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Text returned by a provider, with token usage when the service reports it.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub total_tokens: Option<usize>,
}

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }

    /// Send a chat request and return the completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Provider used with `--offline`; answers locally without any network call.
pub struct LocalProvider;

#[async_trait]
impl LLMProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = crate::interpreter::offline_analysis(prompt)
            .unwrap_or_else(|| format!("(offline) {}", prompt));

        Ok(Completion { content, total_tokens: None })
    }
}

/// Wraps the active provider and reports every call on the event bus.
pub struct LLMManager {
    provider: Box<dyn LLMProvider>,
    event_bus: Option<Arc<EventBus>>,
}

impl LLMManager {
    pub fn new(provider: Box<dyn LLMProvider>) -> Self {
        Self { provider, event_bus: None }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Send a request to the provider and return the response text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let provider = &self.provider;
        debug!(
            "Sending {} messages to {}/{}",
            request.messages.len(),
            provider.name(),
            provider.model_name()
        );

        if let Some(bus) = &self.event_bus {
            let _ = bus
                .emit(Event::APICallStarted {
                    provider: provider.name().to_string(),
                    model: provider.model_name().to_string(),
                })
                .await;
        }

        let result = provider.complete(request).await;

        match &result {
            Ok(completion) => {
                // Rough estimate when the service reports no usage: 1 token ≈ 4 characters
                let tokens = completion
                    .total_tokens
                    .unwrap_or((request.prompt_chars() + completion.content.len()) / 4);
                if let Some(bus) = &self.event_bus {
                    let _ = bus
                        .emit(Event::APICallCompleted {
                            provider: provider.name().to_string(),
                            tokens,
                        })
                        .await;
                }
            }
            Err(e) => {
                warn!("{} request failed: {:#}", provider.name(), e);
                if let Some(bus) = &self.event_bus {
                    let _ = bus
                        .emit(Event::APIError {
                            provider: provider.name().to_string(),
                            error: format!("{:#}", e),
                        })
                        .await;
                }
            }
        }

        result.map(|completion| completion.content)
    }
}
