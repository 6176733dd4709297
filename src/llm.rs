use crate::error::{RagError, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const PERPLEXITY_CHAT_URL: &str = "https://api.perplexity.ai/chat/completions";

/// A single chat message sent to a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user",
            content: content.into(),
        }
    }
}

/// Provider-independent completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A text generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Whether a live credential is available
    fn is_configured(&self) -> bool;

    /// Run a chat completion and return the trimmed reply text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Configuration for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn openai(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Self {
        ProviderConfig {
            name: "OpenAI".to_string(),
            api_key,
            url: OPENAI_CHAT_URL.to_string(),
            model: model.into(),
            timeout,
        }
    }

    pub fn perplexity(
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        ProviderConfig {
            name: "Perplexity".to_string(),
            api_key,
            url: PERPLEXITY_CHAT_URL.to_string(),
            model: model.into(),
            timeout,
        }
    }
}

/// Client for OpenAI-style `/chat/completions` APIs (OpenAI, Perplexity)
#[derive(Clone)]
pub struct ChatCompletionsClient {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// Create a new client with the configured per-call timeout
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::provider(&config.name, e))?;
        Ok(ChatCompletionsClient { config, client })
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RagError::NoProviderConfigured)?;

        let body = CompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            self.config.name,
            self.config.model
        );

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::provider(&self.config.name, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::provider(
                &self.config.name,
                format!("{} - {}", status.as_u16(), error_text),
            ));
        }

        let response_data: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RagError::provider(&self.config.name, e))?;

        first_choice_text(response_data)
            .ok_or_else(|| RagError::provider(&self.config.name, "No response generated"))
    }
}

fn first_choice_text(response: CompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
}

// Wire format shared by OpenAI and Perplexity

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}
