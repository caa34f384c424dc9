//! Suggestions - Dataset-load summary and starter questions
//!
//! Runs once per ingested dataset, outside the turn loop.

use crate::agent_prompts::suggestion_prompt;
use crate::extraction::{extract_json_object, JsonShape};
use crate::llm::{ChatMessage, ChatProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const SUGGESTION_TEMPERATURE: f32 = 0.4;
pub const MAX_QUESTIONS: usize = 4;

pub const PARSE_MISS_SUMMARY: &str = "Dataset loaded successfully. You can run exploratory analyses.";
pub const PARSE_MISS_QUESTIONS: [&str; 2] = [
    "Show a summary of the data",
    "Plot the numeric variables",
];
pub const PROVIDER_FAILURE_SUMMARY: &str = "Data ready.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub summary: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl Suggestions {
    fn parse_miss() -> Self {
        Self {
            summary: PARSE_MISS_SUMMARY.to_string(),
            questions: PARSE_MISS_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }

    fn provider_failure() -> Self {
        Self {
            summary: PROVIDER_FAILURE_SUMMARY.to_string(),
            questions: Vec::new(),
        }
    }
}

pub fn suggestions_shape() -> JsonShape {
    JsonShape::new(&["summary", "questions"], "summary")
}

/// Parse model output into suggestions, `None` on a miss
pub fn parse_suggestions(text: &str) -> Option<Suggestions> {
    let map = extract_json_object(text, &suggestions_shape())?;

    let summary = match map.get("summary") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return None,
    };
    let questions = map
        .get("questions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|q| q.as_str())
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(MAX_QUESTIONS)
                .collect()
        })
        .unwrap_or_default();

    Some(Suggestions { summary, questions })
}

/// Always returns something usable
pub async fn generate_suggestions(provider: &dyn ChatProvider, schema_info: &str) -> Suggestions {
    let messages = [ChatMessage::system(suggestion_prompt(schema_info))];

    match provider.complete(&messages, SUGGESTION_TEMPERATURE).await {
        Ok(text) => match parse_suggestions(&text) {
            Some(suggestions) => {
                info!(questions = suggestions.questions.len(), "Generated dataset suggestions");
                suggestions
            }
            None => {
                warn!("No suggestions object in model output, using fallback");
                Suggestions::parse_miss()
            }
        },
        Err(e) => {
            warn!("Suggestion generation failed: {}", e);
            Suggestions::provider_failure()
        }
    }
}
