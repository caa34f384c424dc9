use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("SQL syntax error: {0}")]
    Syntax(String),

    #[error("Security policy violation: {0}")]
    SecurityPolicy(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for AnalystError {
    fn from(err: polars::error::PolarsError) -> Self {
        AnalystError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalystError>;
