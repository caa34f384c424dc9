//! Turn Loop
//!
//! State machine driving one turn:
//! GenerateSql -> ValidateSql -> ExecuteQuery -> AnalyzeResults -> GenerateViz -> Done,
//! with validation and execution failures looping back to generation until the
//! shared retry budget is spent.

use crate::config::{AnalystConfig, DEFAULT_MAX_RETRIES};
use crate::error::Result;
use crate::execution::DataEngine;
use crate::execution_loop::context::{ContextUpdate, TurnContext, TurnInput};
use crate::execution_loop::steps::AnalystSteps;
use crate::execution_loop::suggestions::{generate_suggestions, Suggestions};
use crate::llm::{ChatMessage, ChatProvider, ProviderChain};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shown to the user when a turn runs out of attempts
pub const ABORT_MESSAGE: &str = "Unable to produce a safe, successful result for this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    GenerateSql,
    ValidateSql,
    ExecuteQuery,
    AnalyzeResults,
    GenerateViz,
    Done,
    Aborted,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Aborted)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::GenerateSql => "generate_sql",
            TurnState::ValidateSql => "validate_sql",
            TurnState::ExecuteQuery => "execute_query",
            TurnState::AnalyzeResults => "analyze_results",
            TurnState::GenerateViz => "generate_viz",
            TurnState::Done => "done",
            TurnState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Transition after `state` has been applied to `ctx`. Terminal states map
/// to themselves.
pub fn next_state(state: TurnState, ctx: &TurnContext, max_retries: u32) -> TurnState {
    let retry_or_abort = || {
        if ctx.retry_count > max_retries {
            TurnState::Aborted
        } else {
            TurnState::GenerateSql
        }
    };

    match state {
        TurnState::GenerateSql => TurnState::ValidateSql,
        TurnState::ValidateSql if ctx.is_safe => TurnState::ExecuteQuery,
        TurnState::ValidateSql => retry_or_abort(),
        TurnState::ExecuteQuery if ctx.error.is_none() => TurnState::AnalyzeResults,
        TurnState::ExecuteQuery => retry_or_abort(),
        TurnState::AnalyzeResults => TurnState::GenerateViz,
        TurnState::GenerateViz => TurnState::Done,
        TurnState::Done => TurnState::Done,
        TurnState::Aborted => TurnState::Aborted,
    }
}

/// Partial state produced by one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepUpdate {
    pub step: TurnState,
    pub update: ContextUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Done,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    pub context: TurnContext,
    pub updates: Vec<StepUpdate>,
    /// Generation attempts made during this turn
    pub attempts: u32,
}

impl TurnOutcome {
    /// Long-term memory for the host to persist and replay next turn
    pub fn last_successful_sql(&self) -> Option<&str> {
        self.context.last_successful_sql.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.status == TurnStatus::Aborted
    }

    /// Last assistant message of the conversation
    pub fn final_message(&self) -> Option<&str> {
        self.context
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

pub struct Orchestrator {
    steps: AnalystSteps,
    max_retries: u32,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ChatProvider>, engine: Arc<dyn DataEngine>) -> Self {
        Self {
            steps: AnalystSteps::new(provider, engine),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Build the provider chain from configuration
    pub fn from_config(config: &AnalystConfig, engine: Arc<dyn DataEngine>) -> Result<Self> {
        let chain = ProviderChain::from_config(&config.llm)?;
        Ok(Self::new(Arc::new(chain), engine)
            .with_max_retries(config.max_retries)
            .with_default_table(config.table_name.clone()))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_table(mut self, table_name: impl Into<String>) -> Self {
        self.steps = self.steps.with_default_table(table_name);
        self
    }

    pub async fn run_turn(&self, input: TurnInput) -> TurnOutcome {
        self.drive(input, None).await
    }

    /// Like [`Orchestrator::run_turn`], also pushing every update to `sender`
    /// as soon as it is produced
    pub async fn run_turn_streaming(
        &self,
        input: TurnInput,
        sender: UnboundedSender<StepUpdate>,
    ) -> TurnOutcome {
        self.drive(input, Some(&sender)).await
    }

    /// Dataset-load suggestions through the same provider
    pub async fn suggest(&self, schema_info: &str) -> Suggestions {
        generate_suggestions(self.steps.provider().as_ref(), schema_info).await
    }

    async fn drive(&self, input: TurnInput, sender: Option<&UnboundedSender<StepUpdate>>) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        let starting_count = input.retry_count;
        let mut ctx = TurnContext::from_input(input);
        let mut updates = Vec::new();
        let mut state = TurnState::GenerateSql;

        info!(turn_id = %turn_id, question = ctx.latest_user_message(), "Starting turn");

        while !state.is_terminal() {
            debug!(turn_id = %turn_id, step = %state, "Running step");
            let update = self.run_step(state, &ctx).await;
            ctx.apply(&update);
            emit(&mut updates, sender, StepUpdate { step: state, update });

            let next = next_state(state, &ctx, self.max_retries);
            if next == TurnState::GenerateSql {
                info!(
                    turn_id = %turn_id,
                    attempt = ctx.retry_count,
                    error = ctx.error.as_deref().unwrap_or(""),
                    "Retrying generation"
                );
            }
            state = next;
        }

        let status = if state == TurnState::Aborted {
            warn!(turn_id = %turn_id, attempts = ctx.retry_count, "Turn aborted, retry budget exhausted");
            let update = ContextUpdate {
                messages: vec![ChatMessage::assistant(ABORT_MESSAGE)],
                ..Default::default()
            };
            ctx.apply(&update);
            emit(&mut updates, sender, StepUpdate { step: state, update });
            TurnStatus::Aborted
        } else {
            info!(turn_id = %turn_id, rows = ctx.execution_result.len(), "Turn completed");
            emit(
                &mut updates,
                sender,
                StepUpdate {
                    step: state,
                    update: ContextUpdate::default(),
                },
            );
            TurnStatus::Done
        };

        TurnOutcome {
            status,
            attempts: ctx.retry_count.saturating_sub(starting_count),
            context: ctx,
            updates,
        }
    }

    async fn run_step(&self, state: TurnState, ctx: &TurnContext) -> ContextUpdate {
        match state {
            TurnState::GenerateSql => self.steps.generate_sql(ctx).await,
            TurnState::ValidateSql => self.steps.validate_sql(ctx),
            TurnState::ExecuteQuery => self.steps.execute_query(ctx).await,
            TurnState::AnalyzeResults => self.steps.analyze_results(ctx).await,
            TurnState::GenerateViz => self.steps.generate_viz(ctx).await,
            TurnState::Done | TurnState::Aborted => ContextUpdate::default(),
        }
    }
}

fn emit(updates: &mut Vec<StepUpdate>, sender: Option<&UnboundedSender<StepUpdate>>, update: StepUpdate) {
    if let Some(sender) = sender {
        if sender.send(update.clone()).is_err() {
            debug!("Update receiver dropped, continuing turn");
        }
    }
    updates.push(update);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(retry_count: u32, is_safe: bool, error: Option<&str>) -> TurnContext {
        let mut ctx = TurnContext::from_input(TurnInput::new(Vec::new(), ""));
        ctx.retry_count = retry_count;
        ctx.is_safe = is_safe;
        ctx.error = error.map(str::to_string);
        ctx
    }

    #[test]
    fn test_happy_path_transitions() {
        let ctx = context(1, true, None);
        assert_eq!(next_state(TurnState::GenerateSql, &ctx, 3), TurnState::ValidateSql);
        assert_eq!(next_state(TurnState::ValidateSql, &ctx, 3), TurnState::ExecuteQuery);
        assert_eq!(next_state(TurnState::ExecuteQuery, &ctx, 3), TurnState::AnalyzeResults);
        assert_eq!(next_state(TurnState::AnalyzeResults, &ctx, 3), TurnState::GenerateViz);
        assert_eq!(next_state(TurnState::GenerateViz, &ctx, 3), TurnState::Done);
    }

    #[test]
    fn test_retry_until_budget_spent() {
        let unsafe_ctx = context(3, false, Some("policy"));
        assert_eq!(next_state(TurnState::ValidateSql, &unsafe_ctx, 3), TurnState::GenerateSql);

        let exhausted = context(4, false, Some("policy"));
        assert_eq!(next_state(TurnState::ValidateSql, &exhausted, 3), TurnState::Aborted);

        let failed_exec = context(4, true, Some("Execution error"));
        assert_eq!(next_state(TurnState::ExecuteQuery, &failed_exec, 3), TurnState::Aborted);

        let retry_exec = context(2, true, Some("Execution error"));
        assert_eq!(next_state(TurnState::ExecuteQuery, &retry_exec, 3), TurnState::GenerateSql);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let ctx = context(0, true, None);
        assert_eq!(next_state(TurnState::Done, &ctx, 3), TurnState::Done);
        assert_eq!(next_state(TurnState::Aborted, &ctx, 3), TurnState::Aborted);
        assert!(TurnState::Done.is_terminal());
        assert!(!TurnState::GenerateViz.is_terminal());
    }

    #[test]
    fn test_state_display_matches_serde() {
        let json = serde_json::to_string(&TurnState::AnalyzeResults).unwrap();
        assert_eq!(json, format!("\"{}\"", TurnState::AnalyzeResults));
    }
}
