//! Direct LLM call executor
//!
//! One provider round-trip per step. The user prompt is either the node's
//! `userPrompt` template rendered against the scope (resolved inputs are in
//! scope, so `${prompt}` reaches a wired port) or the raw `prompt` input. In
//! JSON mode the reply is parsed and, when `outputSchema` is set, validated —
//! an invalid reply fails the step with `LLMValidationError`.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::{render_template, NodeKind};
use foundry_llm::{ChatModel, ChatRequest, OutputMode};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct LlmExecutor {
    chat: Arc<dyn ChatModel>,
}

impl LlmExecutor {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub(crate) fn build_request(&self, request: &ExecRequest) -> Result<ChatRequest> {
        let model = request
            .config_str("model")
            .ok_or_else(|| EngineError::Internal("llm node has no model".to_string()))?;

        let user_prompt = match request.config_str("userPrompt") {
            Some(template) => render_template(template, &request.scope)?,
            None => request
                .input_str("prompt")
                .map(str::to_string)
                .ok_or_else(|| EngineError::PortUnresolved {
                    node: request.node.id.clone(),
                    port: "prompt".to_string(),
                })?,
        };

        let system_prompt = match request.config_str("systemPrompt") {
            Some(template) => Some(render_template(template, &request.scope)?),
            None => request.input_str("system").map(str::to_string),
        };

        let output_mode = match request.config_str("outputMode") {
            Some("json") => OutputMode::Json,
            _ => OutputMode::Text,
        };

        let mut chat_request = ChatRequest::new(model, user_prompt);
        chat_request.system_prompt = system_prompt;
        chat_request.output_mode = output_mode;
        chat_request.output_schema = request.node.config.get("outputSchema").cloned();
        chat_request.temperature = request.node.config.get("temperature").and_then(Value::as_f64);
        chat_request.max_tokens = request.config_u64("maxTokens").map(|v| v as u32);
        chat_request.enable_web_search = request.config_bool("enableWebSearch");
        chat_request.reasoning_effort = request.config_str("reasoningEffort").map(str::to_string);
        Ok(chat_request)
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Llm
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let chat_request = self.build_request(request)?;
        let json_mode = chat_request.output_mode == OutputMode::Json;

        activity.emit(
            "llm-start",
            json!({"model": chat_request.model, "provider": self.chat.name()}),
        );

        let response = self.chat.chat(chat_request).await?;
        let usage = response.usage;

        activity.emit(
            "llm-complete",
            json!({"inputTokens": usage.input_tokens, "outputTokens": usage.output_tokens}),
        );

        let mut outcome = ExecOutcome::new()
            .with_output("text", json!(response.text()))
            .with_output(
                "usage",
                json!({
                    "inputTokens": usage.input_tokens,
                    "outputTokens": usage.output_tokens,
                    "totalTokens": usage.total(),
                }),
            );
        if json_mode {
            outcome.outputs.insert("json".to_string(), response.content);
        }
        outcome.token_count = Some(usage.total());
        Ok(outcome)
    }
}
