//! Agent node executor
//!
//! Invokes the external agent runtime with a templated prompt. When the node
//! config carries a `questions` array, the executor suspends the execution on
//! the first unanswered question; answers land in the execution's answer map
//! and are visible to the prompt template under `answers.*`.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NextSelector, NodeExecutor};
use crate::traits::{AgentProvider, AgentRequest};
use async_trait::async_trait;
use foundry_graph::{render_template, NodeKind};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct AgentExecutor {
    provider: Arc<dyn AgentProvider>,
}

impl AgentExecutor {
    pub fn new(provider: Arc<dyn AgentProvider>) -> Self {
        Self { provider }
    }

    /// First question without an answer and not skipped, if any.
    fn open_question(request: &ExecRequest) -> Option<(String, Value)> {
        let questions = request.node.config.get("questions")?.as_array()?;
        let answers = request.scope.get("answers")?;
        let skipped: Vec<&str> = request
            .scope
            .get("skippedQuestions")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for question in questions {
            let id = question.get("id").and_then(Value::as_str)?;
            if answers.get(id).is_none() && !skipped.contains(&id) {
                return Some((id.to_string(), question.clone()));
            }
        }
        None
    }

    pub(crate) fn build_request(&self, request: &ExecRequest) -> Result<AgentRequest> {
        let template = request
            .config_str("prompt")
            .ok_or_else(|| EngineError::Internal("agent node has no prompt".to_string()))?;
        let prompt = render_template(template, &request.scope)?;

        let capabilities = request
            .node
            .config
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mcp_servers = request
            .node
            .config
            .get("mcpServers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(AgentRequest {
            role: request.config_str("role").map(str::to_string),
            prompt,
            model: request.config_str("model").map(str::to_string),
            capabilities,
            max_turns: request.config_u64("maxTurns").map(|v| v as u32),
            temperature: request.node.config.get("temperature").and_then(Value::as_f64),
            mcp_servers,
        })
    }
}

#[async_trait]
impl NodeExecutor for AgentExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        if let Some((question_id, prompt)) = Self::open_question(request) {
            activity.emit("question", json!({"questionId": question_id, "question": prompt}));
            let mut outcome = ExecOutcome::new();
            outcome.next = NextSelector::Suspend {
                question_id,
                prompt,
            };
            return Ok(outcome);
        }

        let agent_request = self.build_request(request)?;
        activity.emit(
            "agent-start",
            json!({"model": agent_request.model, "role": agent_request.role}),
        );

        let reply = self
            .provider
            .run_agent(agent_request)
            .await
            .map_err(EngineError::Provider)?;

        activity.emit("agent-complete", json!({"tokenCount": reply.token_count}));

        let mut outcome = ExecOutcome::new().with_output("response", reply.response);
        outcome.token_count = reply.token_count;
        Ok(outcome)
    }
}
