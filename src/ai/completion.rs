//! HTTP client for an OpenAI-compatible chat-completions endpoint
//!
//! Two capabilities are exposed:
//! - `generate_text` - plain text completion (challenge candidate batches)
//! - `classify_image` - vision prompt over an image URL (avatar checks)
//!
//! Calls are fire-and-await with the configured timeout; there is no retry
//! here - callers decide whether a failure aborts, skips a batch, or just
//! means "not verified yet".

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::types::{QuestlineError, Result};

/// Capability interface for the external completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate free text from a prompt
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Answer a prompt about an image (vision-capable model)
    async fn classify_image(&self, prompt: &str, image_url: &str) -> Result<String>;
}

/// Configuration for the HTTP completion client
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub api_url: String,
    /// Bearer credential
    pub api_key: String,
    /// Model for text generation
    pub text_model: String,
    /// Vision-capable model for image classification
    pub vision_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            text_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Chat-completions response envelope (only the fields we read)
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Reqwest-backed completion client
pub struct HttpCompletionClient {
    config: CompletionConfig,
    http: reqwest::Client,
}

impl HttpCompletionClient {
    /// Create a new client
    pub fn new(config: CompletionConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(QuestlineError::Config(
                "completion API key is not configured".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QuestlineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Send a chat request and return the first choice's content
    async fn chat(&self, model: &str, content: serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| QuestlineError::Completion(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "Completion API returned non-success status");
            return Err(QuestlineError::Completion(format!(
                "HTTP {} from completion API: {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| QuestlineError::Completion(format!("Malformed response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| QuestlineError::Completion("Response contained no choices".into()))?;

        debug!(model = model, chars = content.len(), "Completion call succeeded");
        Ok(content)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let model = self.config.text_model.clone();
        self.chat(&model, json!(prompt)).await
    }

    async fn classify_image(&self, prompt: &str, image_url: &str) -> Result<String> {
        let content = json!([
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image_url } },
        ]);
        let model = self.config.vision_model.clone();
        self.chat(&model, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let result = HttpCompletionClient::new(CompletionConfig::default());
        assert!(matches!(result, Err(QuestlineError::Config(_))));
    }

    #[test]
    fn test_client_builds_with_key() {
        let config = CompletionConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        assert!(HttpCompletionClient::new(config).is_ok());
    }
}
