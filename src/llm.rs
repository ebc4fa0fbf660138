//! Chat-completion API client
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol. The agent only
//! depends on the [`ChatCompletion`] trait so tests can swap the transport.

use crate::config::LlmConfig;
use crate::error::{Result, TrainerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variables consulted for the API key, in order
pub const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "VITE_OPENAI_API_KEY"];

/// Read the API key from the first populated variable in [`API_KEY_VARS`]
pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|key| !key.is_empty())
}

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Request timeout
    pub timeout_secs: u64,
    pub model: String,
    pub temperature: f32,
    /// Schema for strict JSON output; `None` sends plain requests
    pub response_schema: Option<serde_json::Value>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            response_schema: None,
        }
    }
}

impl ChatConfig {
    pub fn from_llm_config(llm: &LlmConfig) -> Self {
        Self {
            api_key: api_key_from_env().unwrap_or_default(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            timeout_secs: llm.timeout_secs,
            model: llm.model.clone(),
            temperature: llm.temperature,
            response_schema: llm
                .structured_output
                .then(crate::analysis::response_schema),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One completion call: messages in, assistant text out
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Model identifier, for span metadata
    fn model(&self) -> String;
}

/// OpenAI-compatible HTTP client
pub struct OpenAiClient {
    config: ChatConfig,
    http: Client,
}

impl OpenAiClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrainerError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn from_llm_config(llm: &LlmConfig) -> Result<Self> {
        Self::new(ChatConfig::from_llm_config(llm))
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            response_format: self.config.response_schema.as_ref().map(|schema| {
                serde_json::json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "bank_statement_analysis",
                        "strict": true,
                        "schema": schema
                    }
                })
            }),
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if !self.is_configured() {
            return Err(TrainerError::MissingApiKey);
        }

        debug!(model = %self.config.model, "Sending chat completion request");

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&messages))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Chat API error: {} - {}", status, body);
            return Err(TrainerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = parse_choice(chat)?;

        debug!("Chat response received: {} chars", content.len());
        Ok(content)
    }

    fn model(&self) -> String {
        self.config.model.clone()
    }
}

fn parse_choice(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(TrainerError::EmptyResponse)
}
