//! Request/response types shared by all providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the model's reply is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Text,
    Json,
}

/// A single chat-style completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    #[serde(default)]
    pub output_mode: OutputMode,
    /// JSON schema the reply must satisfy when `output_mode` is `json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            user_prompt: user_prompt.into(),
            output_mode: OutputMode::Text,
            output_schema: None,
            temperature: None,
            max_tokens: None,
            enable_web_search: false,
            reasoning_effort: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn json_mode(mut self, schema: Option<Value>) -> Self {
        self.output_mode = OutputMode::Json;
        self.output_schema = schema;
        self
    }
}

/// Token accounting returned by providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl Usage {
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// A completed reply: raw text or parsed JSON, plus usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// `Value::String` in text mode; the parsed object in JSON mode.
    pub content: Value,
    pub usage: Usage,
}

impl ChatResponse {
    /// The textual form of the content.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
