//! LLM - Chat message types and the provider abstraction
//!
//! Every model call in the crate goes through [`ChatProvider::complete`].
//! Concrete providers speak HTTP; [`ProviderChain`] composes a primary and a
//! secondary provider behind the same trait.

pub mod chain;
pub mod gemini;
pub mod openai_compat;
pub mod retry;

pub use chain::ProviderChain;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryPolicy;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Uniform "complete chat" capability
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Complete a chat-style message list at the given temperature
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}
