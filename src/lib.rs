pub mod agent_prompts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod extraction;
pub mod llm;
pub mod security;
pub mod sql_query;

pub use config::AnalystConfig;
pub use error::{AnalystError, Result};
pub use execution::{DataEngine, PolarsEngine};
pub use execution_loop::{Orchestrator, TurnInput, TurnOutcome, TurnStatus};
pub use sql_query::SqlQuery;
