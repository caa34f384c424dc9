//! SQL Query - Immutable candidate query plus its safety verdict
//!
//! The only way to obtain a query marked safe is through the validator,
//! so engines can trust `is_safe()` on anything they are handed.

use crate::error::{AnalystError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlQuery {
    raw_text: String,
    is_safe: bool,
    validation_error: Option<String>,
}

impl SqlQuery {
    /// Create an unvalidated query. Empty or whitespace-only text is rejected.
    pub fn new(raw_text: impl Into<String>) -> Result<Self> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(AnalystError::Input(
                "SQL query cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            raw_text,
            is_safe: false,
            validation_error: None,
        })
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// New instance marked safe, with no validation error
    pub(crate) fn mark_as_safe(&self) -> Self {
        Self {
            raw_text: self.raw_text.clone(),
            is_safe: true,
            validation_error: None,
        }
    }

    /// New instance marked unsafe, carrying the reason
    pub(crate) fn mark_as_unsafe(&self, error: impl Into<String>) -> Self {
        Self {
            raw_text: self.raw_text.clone(),
            is_safe: false,
            validation_error: Some(error.into()),
        }
    }
}
