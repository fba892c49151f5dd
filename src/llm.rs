//! Chat-completion clients.
//!
//! [`ChatModel`] is the seam between the reply generator and the hosted
//! model. Two HTTP implementations are provided:
//! - **[`GeminiChat`]**: Generative Language `generateContent` (default `gemini-1.5-flash`).
//! - **[`OpenAIChat`]**: OpenAI `POST /v1/chat/completions` (default `gpt-4o-mini`).
//!
//! Clients issue one request per call and never retry. The reply deadline is
//! enforced by the reply generator; the HTTP timeout here is a looser bound
//! that only reclaims calls the generator has already abandoned.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{ReplyError, Result};
use crate::http::{self, post_json, require_env};

/// Fixed decoding parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoding {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&LlmConfig> for Decoding {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// A hosted chat model that turns a prompt into text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Run one completion. The returned text may be empty.
    async fn complete(&self, prompt: &str, decoding: Decoding) -> Result<String>;
}

/// The HTTP client outlives the reply deadline so abandoned calls still end.
fn chat_client(config: &LlmConfig) -> Result<reqwest::Client> {
    http::client(Duration::from_secs(config.timeout_secs.saturating_mul(4)))
}

// ============ Gemini ============

pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiChat {
    /// Requires the `GEMINI_API_KEY` environment variable.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_api_key(config, require_env("GEMINI_API_KEY")?)
    }

    fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: chat_client(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-1.5-flash".to_string()),
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, decoding: Decoding) -> Result<String> {
        debug!(provider = "gemini", model = %self.model, prompt_len = prompt.len(), "requesting completion");
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": decoding.temperature,
                "maxOutputTokens": decoding.max_output_tokens,
            },
        });
        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key);

        let json = post_json("gemini", request, &body).await?;
        Ok(parse_gemini_text(&json))
    }
}

/// Concatenates the text parts of the first candidate. Missing parts yield "".
fn parse_gemini_text(json: &serde_json::Value) -> String {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

// ============ OpenAI ============

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChat {
    /// Requires the `OPENAI_API_KEY` environment variable.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_api_key(config, require_env("OPENAI_API_KEY")?)
    }

    fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: chat_client(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, decoding: Decoding) -> Result<String> {
        debug!(provider = "openai", model = %self.model, prompt_len = prompt.len(), "requesting completion");
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": decoding.temperature,
            "max_tokens": decoding.max_output_tokens,
        });
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key));

        let json = post_json("openai", request, &body).await?;
        Ok(parse_openai_text(&json))
    }
}

fn parse_openai_text(json: &serde_json::Value) -> String {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Create the chat model selected by `[llm].provider`.
///
/// # Errors
///
/// [`ReplyError::Config`] for an unknown provider or missing API key.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => Err(ReplyError::Config(format!("Unknown llm provider: {}", other))),
    }
}
