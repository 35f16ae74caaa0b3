use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;
use crate::prompt::{ChatMessage, UpstreamPrompt};

pub const MODEL: &str = "openai/gpt-3.5-turbo";
pub const TEMPERATURE: f32 = 0.8;
pub const MAX_TOKENS: u32 = 800;
pub const PRESENCE_PENALTY: f32 = 0.3;
pub const FREQUENCY_PENALTY: f32 = 0.3;

const REFERER: &str = "http://localhost:3000";
const APP_TITLE: &str = "AI Product Description Generator";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("status {0}")]
    Status(u16),
    #[error("{0}")]
    InvalidResponse(String),
}

/// One bounded, non-retried call to a chat-completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &UpstreamPrompt) -> Result<String, UpstreamError>;
}

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpenRouterClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.api_base),
        })
    }

    fn redact(&self, message: String) -> String {
        message.replace(&self.api_key, "***")
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, prompt: &UpstreamPrompt) -> Result<String, UpstreamError> {
        let body = CompletionRequest {
            model: MODEL,
            messages: prompt.messages(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: false,
            presence_penalty: PRESENCE_PENALTY,
            frequency_penalty: FREQUENCY_PENALTY,
        };

        info!("🔗 Calling completion endpoint: {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(self.redact(e.to_string())))?;

        let status = response.status();
        info!("📥 Upstream status: {}", status);

        if status != reqwest::StatusCode::OK {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ Upstream error response: {}", self.redact(error_body));
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Connection(self.redact(e.to_string())))?;
        extract_content(&text)
    }
}

/// Pulls the first completion's text out of a success body.
pub fn extract_content(body: &str) -> Result<String, UpstreamError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("Unparseable API response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| UpstreamError::InvalidResponse("No content in API response".into()))
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: &'static str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
