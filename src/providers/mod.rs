//! Chat-completion client abstraction.
//!
//! The explainer only needs one request shape: a model name plus a list of
//! role-tagged messages, answered by a list of choices. Everything that talks
//! to a remote API sits behind [`CompletionClient`] so the pipeline can be
//! driven by an in-memory client in tests.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable that supplies the API key ahead of the secret store
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// One message in a chat-completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for `createCompletion`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Response body for `createCompletion`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: Option<ChatMessage>,
}

impl CompletionResponse {
    /// Build a single-choice response, mostly useful for test clients
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: Some(ChatMessage {
                    role: "assistant".to_string(),
                    content: content.into(),
                }),
            }],
        }
    }

    /// Text of the first choice that carries a message
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref().map(|m| m.content.as_str()))
    }
}

/// Client for a chat-completion API
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name for display
    fn name(&self) -> &'static str;

    /// Model used when building requests
    fn model(&self) -> &str;

    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// Settings needed to build a client, read from the `[openai]` config table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Base URL override for compatible endpoints
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 1024,
            base_url: None,
        }
    }
}

/// Error types for completion requests
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key not configured for {provider}. Set {env_var} or run `oops toggle`.")]
    MissingApiKey { provider: String, env_var: String },

    #[error("API error from {provider}: {message}")]
    ApiError { provider: String, message: String },

    #[error("Rate limited by {provider}. Please wait and try again.")]
    RateLimited { provider: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Read the API key from the environment, ignoring empty values
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|s| !s.trim().is_empty())
}
