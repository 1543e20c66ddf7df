//! OpenAI API provider.
//!
//! Talks to the Chat Completions endpoint, or to any endpoint that speaks the
//! same shape when `base_url` is configured.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{CompletionClient, CompletionRequest, CompletionResponse, ProviderConfig, ProviderError};

/// Default OpenAI API base
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

/// OpenAI chat-completion client
pub struct OpenAIClient {
    /// HTTP client
    client: Client,
    /// API key
    api_key: String,
    /// Model to use
    model: String,
    /// Full chat completions URL
    endpoint: String,
}

impl OpenAIClient {
    /// Create a new client from a key and provider settings
    pub fn new(api_key: String, config: &ProviderConfig) -> Self {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/');
        Self {
            client: Client::new(),
            api_key,
            model: config.model.clone(),
            endpoint: format!("{base}/chat/completions"),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw text
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited {
                    provider: PROVIDER.to_string(),
                });
            }
            if status.as_u16() == 401 {
                return Err(ProviderError::MissingApiKey {
                    provider: PROVIDER.to_string(),
                    env_var: super::API_KEY_ENV_VAR.to_string(),
                });
            }
            return Err(ProviderError::ApiError {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, api_error_message(&error_body)),
            });
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })
    }
}
