//! Turn Context
//!
//! The record threaded through one turn. Steps never mutate it directly:
//! each returns a [`ContextUpdate`] that the orchestrator merges.

use crate::dataset::Row;
use crate::execution_loop::visualization::ChartSpec;
use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// What the host hands in at the start of a turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnInput {
    /// Full conversation so far, ending with the new user question
    pub messages: Vec<ChatMessage>,
    pub schema_info: String,
    /// Long-term memory replayed from the previous turn
    #[serde(default)]
    pub last_successful_sql: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl TurnInput {
    pub fn new(messages: Vec<ChatMessage>, schema_info: impl Into<String>) -> Self {
        Self {
            messages,
            schema_info: schema_info.into(),
            last_successful_sql: None,
            retry_count: 0,
        }
    }

    pub fn with_last_successful_sql(mut self, sql: Option<String>) -> Self {
        self.last_successful_sql = sql;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    pub messages: Vec<ChatMessage>,
    pub schema_info: String,
    pub sql_query: String,
    pub is_safe: bool,
    pub execution_result: Vec<Row>,
    pub viz_config: ChartSpec,
    pub error: Option<String>,
    /// Incremented once per generation attempt
    pub retry_count: u32,
    pub last_successful_sql: Option<String>,
}

impl TurnContext {
    pub fn from_input(input: TurnInput) -> Self {
        Self {
            messages: input.messages,
            schema_info: input.schema_info,
            sql_query: String::new(),
            is_safe: false,
            execution_result: Vec::new(),
            viz_config: ChartSpec::none(),
            error: None,
            retry_count: input.retry_count,
            last_successful_sql: input.last_successful_sql,
        }
    }

    /// The question being answered this turn
    pub fn latest_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    pub fn apply(&mut self, update: &ContextUpdate) {
        if let Some(sql) = &update.sql_query {
            self.sql_query = sql.clone();
        }
        if let Some(is_safe) = update.is_safe {
            self.is_safe = is_safe;
        }
        if let Some(rows) = &update.execution_result {
            self.execution_result = rows.clone();
        }
        if let Some(spec) = &update.viz_config {
            self.viz_config = spec.clone();
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }
        if let Some(count) = update.retry_count {
            self.retry_count = count;
        }
        if let Some(sql) = &update.last_successful_sql {
            self.last_successful_sql = Some(sql.clone());
        }
        self.messages.extend(update.messages.iter().cloned());
    }
}

/// Partial update produced by one step. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_safe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viz_config: Option<ChartSpec>,
    /// `Some(None)` clears the error, `Some(Some(..))` sets it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_sql: Option<String>,
    /// Appended to the conversation
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
}

impl ContextUpdate {
    pub fn set_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TurnContext {
        TurnContext::from_input(
            TurnInput::new(vec![ChatMessage::user("total sales?")], "Table: t")
                .with_last_successful_sql(Some("SELECT 1".to_string())),
        )
    }

    #[test]
    fn test_from_input_defaults() {
        let ctx = context();
        assert_eq!(ctx.retry_count, 0);
        assert!(!ctx.is_safe);
        assert!(ctx.viz_config.is_none());
        assert_eq!(ctx.latest_user_message(), "total sales?");
        assert_eq!(ctx.last_successful_sql.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_apply_leaves_untouched_fields() {
        let mut ctx = context();
        ctx.apply(&ContextUpdate {
            sql_query: Some("SELECT 2".to_string()),
            retry_count: Some(1),
            ..Default::default()
        }.set_error("boom"));

        assert_eq!(ctx.sql_query, "SELECT 2");
        assert_eq!(ctx.error.as_deref(), Some("boom"));
        assert_eq!(ctx.last_successful_sql.as_deref(), Some("SELECT 1"));

        ctx.apply(&ContextUpdate::default());
        assert_eq!(ctx.error.as_deref(), Some("boom"));

        ctx.apply(&ContextUpdate::default().clear_error());
        assert_eq!(ctx.error, None);
    }

    #[test]
    fn test_messages_are_appended() {
        let mut ctx = context();
        ctx.apply(&ContextUpdate {
            messages: vec![ChatMessage::assistant("42")],
            ..Default::default()
        });
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.latest_user_message(), "total sales?");
    }
}
