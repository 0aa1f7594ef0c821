//! Provider trait and shared client configuration.

use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::time::Duration;

/// A chat-capable model provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Issue one completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Human-readable provider name for logging.
    fn name(&self) -> &str;
}

/// Connection configuration shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read the API key from an environment variable.
    pub fn from_env(key_var: &str, base_url: &str) -> Result<Self> {
        let api_key =
            std::env::var(key_var).map_err(|_| LlmError::ApiKeyNotFound(key_var.to_string()))?;
        Ok(Self::new(api_key, base_url))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> LlmError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return LlmError::Authentication(body.to_string());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            retry_after_secs: retry_after,
        };
    }
    LlmError::Provider(format!("{status}: {body}"))
}

/// Extract the `Retry-After` header in seconds, when present.
pub(crate) fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
