//! Provider Chain
//!
//! Primary-with-fallback composition. The primary is optional; when it fails
//! for any reason the secondary is tried and the caller only ever sees the
//! final success or the secondary's failure.

use crate::config::LlmConfig;
use crate::error::{AnalystError, Result};
use crate::llm::{ChatMessage, ChatProvider, GeminiProvider, OpenAiCompatProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ProviderChain {
    primary: Option<Arc<dyn ChatProvider>>,
    secondary: Arc<dyn ChatProvider>,
}

impl ProviderChain {
    pub fn new(primary: Option<Arc<dyn ChatProvider>>, secondary: Arc<dyn ChatProvider>) -> Self {
        Self { primary, secondary }
    }

    /// Gemini primary (if keyed) with a mandatory Groq secondary
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let secondary_settings = config.secondary.as_ref().ok_or_else(|| {
            AnalystError::Configuration(
                "GROQ_API_KEY is required for the fallback provider".to_string(),
            )
        })?;
        let secondary: Arc<dyn ChatProvider> =
            Arc::new(OpenAiCompatProvider::new("groq", secondary_settings)?);

        let primary: Option<Arc<dyn ChatProvider>> = match &config.primary {
            Some(settings) => Some(Arc::new(GeminiProvider::new(settings)?)),
            None => {
                warn!("GOOGLE_API_KEY not found, using only the secondary provider");
                None
            }
        };

        Ok(Self::new(primary, secondary))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl ChatProvider for ProviderChain {
    fn name(&self) -> &str {
        "provider-chain"
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        if let Some(primary) = &self.primary {
            match primary.complete(messages, temperature).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(
                        primary = primary.name(),
                        secondary = self.secondary.name(),
                        "Primary provider failed, falling back: {}",
                        e
                    );
                }
            }
        }

        let result = self.secondary.complete(messages, temperature).await;
        if result.is_ok() && self.primary.is_some() {
            info!(secondary = self.secondary.name(), "Fallback provider answered");
        }
        result.map_err(|e| match e {
            AnalystError::Provider(message) => AnalystError::Provider(message),
            other => AnalystError::Provider(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        reply: std::result::Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, text: &'static str) -> Arc<Self> {
            Arc::new(Self { name, reply: Ok(text), calls: AtomicUsize::new(0) })
        }

        fn failing(name: &'static str, message: &'static str) -> Arc<Self> {
            Arc::new(Self { name, reply: Err(message), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(|t| t.to_string())
                .map_err(|m| AnalystError::Provider(m.to_string()))
        }
    }

    fn ask() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = Scripted::ok("primary", "from primary");
        let secondary = Scripted::ok("secondary", "from secondary");
        let chain = ProviderChain::new(Some(primary.clone()), secondary.clone());

        assert_eq!(chain.complete(&ask(), 0.0).await.unwrap(), "from primary");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_is_hidden() {
        let primary = Scripted::failing("primary", "429 rate limited");
        let secondary = Scripted::ok("secondary", "from secondary");
        let chain = ProviderChain::new(Some(primary.clone()), secondary.clone());

        assert_eq!(chain.complete(&ask(), 0.0).await.unwrap(), "from secondary");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_secondary_message() {
        let primary = Scripted::failing("primary", "timeout");
        let secondary = Scripted::failing("secondary", "connection refused");
        let chain = ProviderChain::new(Some(primary), secondary);

        match chain.complete(&ask(), 0.0).await {
            Err(AnalystError::Provider(message)) => assert_eq!(message, "connection refused"),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_secondary_only() {
        let secondary = Scripted::ok("secondary", "only me");
        let chain = ProviderChain::new(None, secondary.clone());
        assert!(!chain.has_primary());
        assert_eq!(chain.complete(&ask(), 0.7).await.unwrap(), "only me");
    }

    #[test]
    fn test_missing_secondary_is_configuration_error() {
        let config = LlmConfig {
            primary: Some(ProviderSettings::gemini("g")),
            secondary: None,
        };
        assert!(matches!(
            ProviderChain::from_config(&config),
            Err(AnalystError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_config_without_primary_degrades() {
        let config = LlmConfig {
            primary: None,
            secondary: Some(ProviderSettings::groq("q")),
        };
        let chain = ProviderChain::from_config(&config).unwrap();
        assert!(!chain.has_primary());
    }
}
