//! Error types for LLM provider implementations.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when working with LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// API key not found in configuration or environment.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Provider returned a malformed or unexpected response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON-mode response failed schema validation.
    #[error("response failed schema validation: {0}")]
    SchemaValidation(String),

    /// Rate limit exceeded; carries the provider's retry-after hint when set.
    #[error("rate limit exceeded{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// General provider error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Http(_)
                | LlmError::Timeout(_)
                | LlmError::RateLimited { .. }
                | LlmError::Provider(_)
        )
    }

    /// Provider retry-after hint, in seconds, when the provider sent one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}
