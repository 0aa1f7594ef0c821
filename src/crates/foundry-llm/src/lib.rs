//! LLM provider integrations for the Foundry workflow engine
//!
//! A narrow surface over the providers the `llm` and `agent` node kinds call:
//! the [`ChatModel`] trait, the shared request/response types, and HTTP
//! clients for Anthropic- and OpenAI-style APIs. JSON-mode replies can be
//! validated against a caller-supplied JSON schema.
//!
//! Providers are deliberately thin; retry policy lives with the caller (the
//! engine never retries implicitly), but [`LlmError::is_retryable`] and
//! [`LlmError::retry_after`] expose what the provider hinted.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod openai;
pub mod types;
pub mod validate;

pub use anthropic::AnthropicClient;
pub use client::{ChatModel, ProviderConfig};
pub use error::{LlmError, Result};
pub use openai::OpenAiClient;
pub use types::{ChatRequest, ChatResponse, OutputMode, Usage};
pub use validate::{parse_json_reply, validate_against_schema};
