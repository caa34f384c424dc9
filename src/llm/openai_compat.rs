//! OpenAI-compatible chat completions provider (Groq and friends)

use crate::config::ProviderSettings;
use crate::error::{AnalystError, Result};
use crate::llm::retry::{retry_with_backoff, status_is_transient, AttemptError, RetryPolicy};
use crate::llm::{ChatMessage, ChatProvider};
use async_trait::async_trait;
use tracing::{debug, warn};

pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AnalystError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            retry: RetryPolicy::with_max_retries(settings.max_retries),
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("{} API error ({}): {}", self.name, status, error_text);
            return Err(if status_is_transient(status) {
                AttemptError::transient(message)
            } else {
                AttemptError::permanent(message)
            });
        }

        let response_json: serde_json::Value = response.json().await?;
        extract_content(&response_json).map_err(AttemptError::permanent)
    }
}

/// Pull the assistant text out of a chat completions response
fn extract_content(response_json: &serde_json::Value) -> std::result::Result<String, String> {
    if let Some(error) = response_json.get("error") {
        return Err(format!("LLM API error: {}", error));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| "No choices in LLM response".to_string())?;

    if let Some(finish_reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
        if finish_reason == "length" {
            warn!("LLM response was truncated due to length limit");
        } else if finish_reason == "content_filter" {
            return Err("LLM response was filtered by content policy".to_string());
        }
    }

    choice["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "No content in LLM response".to_string())
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });

        debug!(provider = %self.name, model = %self.model, "Sending chat completion");
        retry_with_backoff(&self.retry, || self.send_once(&body))
            .await
            .map_err(|e| AnalystError::Provider(e.message))
    }
}
