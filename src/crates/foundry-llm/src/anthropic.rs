//! Anthropic messages-API client.

use crate::client::{retry_after_secs, status_error, ChatModel, ProviderConfig};
use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ChatResponse, OutputMode, Usage};
use crate::validate::{parse_json_reply, validate_against_schema};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic API client.
#[derive(Clone)]
pub struct AnthropicClient {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { config, client })
    }

    fn build_body(&self, request: &ChatRequest) -> WireRequest {
        let mut system = request.system_prompt.clone();
        if request.output_mode == OutputMode::Json {
            let hint = "Respond with a single JSON object and nothing else.";
            system = Some(match system {
                Some(existing) => format!("{existing}\n\n{hint}"),
                None => hint.to_string(),
            });
        }
        WireRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: request.user_prompt.clone(),
            }],
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let retry = retry_after_secs(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text, retry));
        }

        let wire: WireResponse = response.json().await?;
        let text = wire
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = Usage {
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
        };

        let content = finish_content(&request, &text)?;
        Ok(ChatResponse { content, usage })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Text mode returns the raw string; JSON mode parses and, when a schema is
/// configured, validates.
pub(crate) fn finish_content(request: &ChatRequest, text: &str) -> Result<Value> {
    match request.output_mode {
        OutputMode::Text => Ok(Value::String(text.to_string())),
        OutputMode::Json => {
            let parsed = parse_json_reply(text)?;
            if let Some(schema) = &request.output_schema {
                validate_against_schema(&parsed, schema)?;
            }
            Ok(parsed)
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}
