//! Turn Steps
//!
//! One method per state of the turn loop. Every step reads the context and
//! returns a [`ContextUpdate`]; failures are recorded in the update, never
//! propagated.

use crate::agent_prompts::{analysis_prompt, corrective_prompt, sql_generation_prompt};
use crate::config::DEFAULT_TABLE_NAME;
use crate::dataset::rows_to_json;
use crate::error::AnalystError;
use crate::execution::DataEngine;
use crate::execution_loop::context::{ContextUpdate, TurnContext};
use crate::execution_loop::visualization::infer_chart_spec;
use crate::extraction::extract_sql;
use crate::llm::{ChatMessage, ChatProvider};
use crate::security::SqlValidator;
use crate::sql_query::SqlQuery;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GENERATION_TEMPERATURE: f32 = 0.0;
pub const ANALYSIS_TEMPERATURE: f32 = 0.2;
pub const ANALYSIS_SAMPLE_ROWS: usize = 15;

/// Used when a provider call fails during generation
pub const PLACEHOLDER_SQL: &str = "SELECT 1";
pub const NO_RESULTS_MESSAGE: &str = "No results.";

lazy_static! {
    // A keyword alone is not enough: prose lines start with "With" or "Update" too
    static ref LEAKED_STATEMENT: Regex = Regex::new(
        r"(?ims)^[ \t]*(?:SELECT\b[^;]*?\bFROM\b|WITH\s+\w+\s+AS\s*\(|UPDATE\s+\w+\s+SET\b|INSERT\s+INTO\b|DELETE\s+FROM\b)[^;]*;"
    )
    .expect("static pattern");
    static ref LEAKED_FENCE: Regex = Regex::new(r"(?is)```sql.*?```").expect("static pattern");
}

/// Remove SQL statements and fenced SQL blocks from an explanation
pub fn strip_leaked_sql(text: &str) -> String {
    let without_fences = LEAKED_FENCE.replace_all(text, "");
    let without_statements = LEAKED_STATEMENT.replace_all(&without_fences, "");
    without_statements.trim().to_string()
}

pub struct AnalystSteps {
    provider: Arc<dyn ChatProvider>,
    engine: Arc<dyn DataEngine>,
    default_table: String,
}

impl AnalystSteps {
    pub fn new(provider: Arc<dyn ChatProvider>, engine: Arc<dyn DataEngine>) -> Self {
        Self {
            provider,
            engine,
            default_table: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    pub fn with_default_table(mut self, table_name: impl Into<String>) -> Self {
        self.default_table = table_name.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    /// Bounded sample substituted when nothing usable comes back
    pub fn default_query(&self) -> String {
        format!("SELECT * FROM {} LIMIT 5", self.default_table)
    }

    pub async fn generate_sql(&self, ctx: &TurnContext) -> ContextUpdate {
        let system = sql_generation_prompt(&ctx.schema_info, ctx.last_successful_sql.as_deref());
        let question = ctx.latest_user_message();

        let instruction = match &ctx.error {
            Some(error) => {
                info!(attempt = ctx.retry_count + 1, "Requesting corrected query");
                corrective_prompt(&ctx.sql_query, error, question)
            }
            None => question.to_string(),
        };

        let messages = [ChatMessage::system(system), ChatMessage::user(instruction)];
        let retry_count = Some(ctx.retry_count + 1);

        match self.provider.complete(&messages, GENERATION_TEMPERATURE).await {
            Ok(text) => {
                let sql = extract_sql(&text).unwrap_or_else(|| {
                    warn!("Empty SQL after cleanup, using default query");
                    self.default_query()
                });
                debug!("Generated SQL: {}", sql);
                ContextUpdate {
                    sql_query: Some(sql),
                    retry_count,
                    ..Default::default()
                }
                .clear_error()
            }
            Err(e) => {
                warn!("SQL generation failed: {}", e);
                let message = match e {
                    AnalystError::Provider(msg) => msg,
                    other => other.to_string(),
                };
                ContextUpdate {
                    sql_query: Some(PLACEHOLDER_SQL.to_string()),
                    retry_count,
                    ..Default::default()
                }
                .set_error(format!("LLM Error: {}", message))
            }
        }
    }

    pub fn validate_sql(&self, ctx: &TurnContext) -> ContextUpdate {
        // A failed generation leaves its error in place; the placeholder is
        // never executed
        if ctx.error.is_some() {
            return ContextUpdate {
                is_safe: Some(false),
                ..Default::default()
            };
        }

        let query = match SqlQuery::new(ctx.sql_query.as_str()) {
            Ok(query) => query,
            Err(e) => {
                return ContextUpdate {
                    is_safe: Some(false),
                    ..Default::default()
                }
                .set_error(e.to_string())
            }
        };

        let validated = SqlValidator::validate(&query);
        let update = ContextUpdate {
            is_safe: Some(validated.is_safe()),
            ..Default::default()
        };
        match validated.validation_error() {
            Some(reason) => {
                warn!("Query rejected: {}", reason);
                update.set_error(reason)
            }
            None => update.clear_error(),
        }
    }

    pub async fn execute_query(&self, ctx: &TurnContext) -> ContextUpdate {
        let failed = |message: String| {
            ContextUpdate {
                execution_result: Some(Vec::new()),
                ..Default::default()
            }
            .set_error(message)
        };

        // The engine only ever sees an object produced by the validator
        let query = match SqlQuery::new(ctx.sql_query.as_str()) {
            Ok(query) => SqlValidator::validate(&query),
            Err(e) => return failed(e.to_string()),
        };

        match self.engine.execute_query(&query).await {
            Ok(rows) => {
                info!(engine = self.engine.name(), rows = rows.len(), "Query executed");
                ContextUpdate {
                    execution_result: Some(rows),
                    last_successful_sql: Some(query.raw_text().to_string()),
                    ..Default::default()
                }
                .clear_error()
            }
            Err(e) => {
                warn!(engine = self.engine.name(), "Query execution failed: {}", e);
                failed(e.to_string())
            }
        }
    }

    pub async fn analyze_results(&self, ctx: &TurnContext) -> ContextUpdate {
        let content = if ctx.execution_result.is_empty() {
            NO_RESULTS_MESSAGE.to_string()
        } else {
            let rows = &ctx.execution_result;
            let sample = rows_to_json(&rows[..rows.len().min(ANALYSIS_SAMPLE_ROWS)]);
            let prompt = analysis_prompt(ctx.latest_user_message(), &sample);

            match self
                .provider
                .complete(&[ChatMessage::user(prompt)], ANALYSIS_TEMPERATURE)
                .await
            {
                Ok(text) => strip_leaked_sql(&text),
                Err(e) => {
                    warn!("Result analysis failed: {}", e);
                    format!("Error analyzing results: {}", e)
                }
            }
        };

        ContextUpdate {
            messages: vec![ChatMessage::assistant(content)],
            ..Default::default()
        }
    }

    pub async fn generate_viz(&self, ctx: &TurnContext) -> ContextUpdate {
        let spec = infer_chart_spec(
            self.provider.as_ref(),
            &ctx.execution_result,
            ctx.latest_user_message(),
        )
        .await;

        ContextUpdate {
            viz_config: Some(spec),
            ..Default::default()
        }
    }
}
