//! Configuration
//!
//! Everything is read from environment variables (a `.env` file is loaded by
//! the binary first). The secondary provider credential is mandatory, but
//! that is enforced when the provider chain is built, not here.

use crate::error::{AnalystError, Result};
use std::time::Duration;

pub const DEFAULT_TABLE_NAME: &str = "dataset";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Connection settings for one provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: usize,
}

impl ProviderSettings {
    /// Primary defaults: short timeout, a single retry
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: GEMINI_DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 1,
        }
    }

    /// Secondary defaults
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: GROQ_DEFAULT_MODEL.to_string(),
            base_url: GROQ_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Gemini, tried first when configured
    pub primary: Option<ProviderSettings>,
    /// Groq (OpenAI-compatible), always required
    pub secondary: Option<ProviderSettings>,
}

#[derive(Debug, Clone)]
pub struct AnalystConfig {
    pub llm: LlmConfig,
    /// Table the dataset is loaded into, also used by the default query
    pub table_name: String,
    /// Generation retries allowed after the first attempt
    pub max_retries: u32,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl AnalystConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, map in tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let primary = non_empty("GOOGLE_API_KEY").map(|key| {
            let mut settings = ProviderSettings::gemini(key);
            if let Some(model) = non_empty("GEMINI_MODEL") {
                settings.model = model;
            }
            if let Some(url) = non_empty("GEMINI_BASE_URL") {
                settings.base_url = url;
            }
            settings
        });

        let secondary = non_empty("GROQ_API_KEY").map(|key| {
            let mut settings = ProviderSettings::groq(key);
            if let Some(model) = non_empty("GROQ_MODEL") {
                settings.model = model;
            }
            if let Some(url) = non_empty("GROQ_BASE_URL") {
                settings.base_url = url;
            }
            settings
        });

        let table_name = non_empty("ANALYST_TABLE").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());

        let max_retries = match non_empty("ANALYST_MAX_RETRIES") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                AnalystError::Configuration(format!(
                    "ANALYST_MAX_RETRIES must be a non-negative integer, got '{}': {}",
                    raw, e
                ))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(Self {
            llm: LlmConfig { primary, secondary },
            table_name,
            max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_keys() {
        let config = AnalystConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.llm.primary.is_none());
        assert!(config.llm.secondary.is_none());
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_both_providers_and_overrides() {
        let config = AnalystConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GROQ_API_KEY", "q-key"),
            ("GROQ_MODEL", "llama-3.1-8b-instant"),
            ("ANALYST_TABLE", "sismos"),
        ]))
        .unwrap();

        let primary = config.llm.primary.unwrap();
        assert_eq!(primary.model, GEMINI_DEFAULT_MODEL);
        assert_eq!(primary.request_timeout, Duration::from_secs(10));
        assert_eq!(primary.max_retries, 1);

        let secondary = config.llm.secondary.unwrap();
        assert_eq!(secondary.api_key, "q-key");
        assert_eq!(secondary.model, "llama-3.1-8b-instant");
        assert_eq!(secondary.max_retries, 3);
        assert_eq!(config.table_name, "sismos");
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = AnalystConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "  ")])).unwrap();
        assert!(config.llm.primary.is_none());
    }

    #[test]
    fn test_bad_retry_budget_is_configuration_error() {
        let result = AnalystConfig::from_lookup(lookup(&[("ANALYST_MAX_RETRIES", "many")]));
        assert!(matches!(result, Err(AnalystError::Configuration(_))));
    }
}
