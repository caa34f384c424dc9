//! Gemini generateContent provider

use crate::config::ProviderSettings;
use crate::error::{AnalystError, Result};
use crate::llm::retry::{retry_with_backoff, status_is_transient, AttemptError, RetryPolicy};
use crate::llm::{ChatMessage, ChatProvider, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(|r| r.to_string()),
        parts: vec![GeminiPart { text: Some(text.to_string()) }],
    }
}

/// Split system messages into the system instruction; Gemini calls the
/// assistant role "model".
fn build_request(messages: &[ChatMessage], temperature: f32) -> GeminiRequest {
    let system_text: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut contents: Vec<GeminiContent> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            text_content(Some(role), &m.content)
        })
        .collect();

    let system_instruction = if contents.is_empty() {
        // A lone system prompt has to travel as user content
        contents.push(text_content(Some("user"), &system_text.join("\n\n")));
        None
    } else if system_text.is_empty() {
        None
    } else {
        Some(text_content(None, &system_text.join("\n\n")))
    };

    GeminiRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig { temperature },
    }
}

fn extract_text(response: GeminiResponse) -> std::result::Result<String, String> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| "No candidates in Gemini response".to_string())?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        return Err("Empty content in Gemini response".to_string());
    }
    Ok(text)
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AnalystError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            retry: RetryPolicy::with_max_retries(settings.max_retries),
        })
    }

    async fn send_once(&self, request: &GeminiRequest) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Gemini API error ({}): {}", status, error_text);
            return Err(if status_is_transient(status) {
                AttemptError::transient(message)
            } else {
                AttemptError::permanent(message)
            });
        }

        let parsed: GeminiResponse = response.json().await?;
        extract_text(parsed).map_err(AttemptError::permanent)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request = build_request(messages, temperature);
        debug!(model = %self.model, "Sending Gemini generateContent");
        retry_with_backoff(&self.retry, || self.send_once(&request))
            .await
            .map_err(|e| AnalystError::Provider(e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_becomes_instruction() {
        let request = build_request(
            &[ChatMessage::system("rules"), ChatMessage::user("question")],
            0.0,
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "question");
        assert_eq!(value["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_lone_system_prompt_sent_as_user() {
        let request = build_request(&[ChatMessage::system("make a chart")], 0.0);
        assert!(request.system_instruction.is_none());
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn test_assistant_maps_to_model_role() {
        let request = build_request(
            &[ChatMessage::user("a"), ChatMessage::assistant("b")],
            0.2,
        );
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "SELECT "}, {"text": "1"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "SELECT 1");

        let empty: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(extract_text(empty).is_err());
    }
}
