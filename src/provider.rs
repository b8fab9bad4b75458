//! Model-service capability traits and the OpenAI-backed implementation.
//!
//! The pipeline consumes two opaque model services — an embedding-vector
//! generator and a text-generation model — plus an optional web-search
//! provider. Each is a trait so components receive injected clients and
//! tests can substitute deterministic fakes.
//!
//! # Retry Strategy
//!
//! The OpenAI client retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelConfig;

/// Generates a fixed-dimension vector for a piece of text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Role of a prompt message sent to the generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One message in a generation prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Produces answer text from an ordered prompt.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, messages: &[PromptMessage]) -> Result<String>;
}

/// Optional external web-search collaborator. Absence degrades to no web
/// context; it must never break the answer flow.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    /// Returns a short text digest of web results for `query`.
    async fn search(&self, query: &str) -> Result<String>;
}

// ============ OpenAI client ============

/// Embedding + generation client backed by the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiClient {
    api_key: String,
    embed_model: String,
    chat_model: String,
    dims: usize,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let embed_model = config
            .embed_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.embed_model required for OpenAI provider"))?;
        let chat_model = config
            .chat_model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("model.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            embed_model,
            chat_model,
            dims,
            max_retries: config.max_retries,
            http,
        })
    }

    /// POST a JSON body with retry/backoff, returning the parsed response.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("request failed after retries")))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": text,
        });
        let json = self
            .post_with_retry("https://api.openai.com/v1/embeddings", &body)
            .await?;

        let embedding = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        Ok(embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": messages,
        });
        let json = self
            .post_with_retry("https://api.openai.com/v1/chat/completions", &body)
            .await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}
