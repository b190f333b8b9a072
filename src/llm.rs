//! Generation provider abstraction and implementations.
//!
//! The analyzer's model-backed sub-extractions and the answer engine both
//! go through [`GenerationProvider`]. Implementations:
//! - [`DisabledProvider`] — returns errors; sub-extractions that need a
//!   model then fail in isolation while heuristic paths keep working.
//! - [`OpenAiProvider`] — calls the OpenAI chat-completions API with the
//!   same transient-error retry policy as the embedding provider.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result};

/// A provider that turns a system + user prompt into generated text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Run one completion and return the generated text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Create the provider named by the configuration.
pub fn create_provider(config: &AnalysisConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => Err(PipelineError::ValidationError(format!(
            "unknown analysis provider: {}",
            other
        ))),
    }
}

// ============ Disabled provider ============

/// A no-op provider that always returns errors. Used when
/// `analysis.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl GenerationProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Err(PipelineError::GenerationFailed(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI provider ============

/// Generation provider backed by `POST /v1/chat/completions`. Requires
/// the `OPENAI_API_KEY` environment variable. Temperature is pinned to 0
/// because extraction prompts want determinism, not creativity.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            PipelineError::ValidationError("analysis.model required for OpenAI provider".into())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            PipelineError::ValidationError("OPENAI_API_KEY environment variable not set".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::GenerationFailed(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Set a custom base URL (Azure, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::GenerationFailed(format!("response body: {}", e))
                        })?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(attempt, %status, "chat API transient error, retrying");
                        last_err = Some(PipelineError::GenerationFailed(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::GenerationFailed(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::GenerationFailed(format!("network: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::GenerationFailed("generation failed after retries".to_string())
        }))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            PipelineError::GenerationFailed("invalid response: missing message content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_content_extracted() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  hello  "}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "hello");
    }

    #[test]
    fn malformed_chat_response_is_generation_failure() {
        let json = serde_json::json!({"choices": []});
        let err = parse_chat_response(&json).unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn disabled_provider_always_errors() {
        let provider = DisabledProvider;
        let err = provider.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
    }
}
