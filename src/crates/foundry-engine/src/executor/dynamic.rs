//! Dynamic agent/command executors
//!
//! Like their static counterparts, but the prompt/model/command are produced
//! by evaluating expression strings against the execution scope first. The
//! resolved values are written over the node config, then the static
//! executor runs. Expression failures are `EvalError`s.

use crate::error::{EngineError, Result};
use crate::executor::agent::AgentExecutor;
use crate::executor::command::CommandExecutor;
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::{Expr, NodeKind};
use serde_json::Value;
use std::sync::Arc;

/// Evaluate an expression-config key into a string.
fn resolve_expr(request: &ExecRequest, key: &str) -> Result<Option<String>> {
    let Some(source) = request.config_str(key) else {
        return Ok(None);
    };
    let expr = Expr::parse(source).map_err(|e| EngineError::Eval(format!("{key}: {e}")))?;
    match expr.eval(&request.scope) {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Err(EngineError::Eval(format!("{key} evaluated to null"))),
        other => Ok(Some(foundry_graph::expr::stringify(&other))),
    }
}

/// Clone the request with resolved keys written into the node config.
fn with_resolved(request: &ExecRequest, resolved: Vec<(&str, String)>) -> ExecRequest {
    let mut patched = request.clone();
    if let Value::Object(config) = &mut patched.node.config {
        for (key, value) in resolved {
            config.insert(key.to_string(), Value::String(value));
        }
    }
    patched
}

pub struct DynamicAgentExecutor {
    inner: Arc<AgentExecutor>,
}

impl DynamicAgentExecutor {
    pub fn new(inner: Arc<AgentExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl NodeExecutor for DynamicAgentExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::DynamicAgent
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let mut resolved = Vec::new();
        if let Some(prompt) = resolve_expr(request, "promptExpr")? {
            resolved.push(("prompt", prompt));
        } else {
            return Err(EngineError::Eval(
                "dynamic-agent node has no promptExpr".to_string(),
            ));
        }
        if let Some(model) = resolve_expr(request, "modelExpr")? {
            resolved.push(("model", model));
        }
        if let Some(role) = resolve_expr(request, "roleExpr")? {
            resolved.push(("role", role));
        }

        let patched = with_resolved(request, resolved);
        self.inner.execute(&patched, activity).await
    }
}

pub struct DynamicCommandExecutor {
    inner: Arc<CommandExecutor>,
}

impl DynamicCommandExecutor {
    pub fn new(inner: Arc<CommandExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl NodeExecutor for DynamicCommandExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::DynamicCommand
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let command = resolve_expr(request, "commandExpr")?.ok_or_else(|| {
            EngineError::Eval("dynamic-command node has no commandExpr".to_string())
        })?;

        let patched = with_resolved(request, vec![("command", command)]);
        self.inner.execute(&patched, activity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::traits::{AgentProvider, AgentRequest, AgentResponse};
    use foundry_graph::PlanNode;
    use serde_json::{json, Map};
    use std::collections::HashMap;

    struct EchoProvider;

    #[async_trait]
    impl AgentProvider for EchoProvider {
        async fn run_agent(&self, request: AgentRequest) -> std::result::Result<AgentResponse, String> {
            Ok(AgentResponse {
                response: json!({"prompt": request.prompt, "model": request.model}),
                token_count: None,
            })
        }
    }

    fn request(kind: NodeKind, config: Value, scope: Value) -> ExecRequest {
        ExecRequest {
            execution_id: "exec".into(),
            node: PlanNode {
                id: "dyn".into(),
                kind,
                config,
            },
            inputs: Map::new(),
            scope,
            env: HashMap::new(),
        }
    }

    fn sink() -> ActivitySink {
        ActivitySink::new(Arc::new(EventBus::new()), "exec", "dyn")
    }

    #[tokio::test]
    async fn test_dynamic_agent_resolves_prompt_and_model() {
        let executor =
            DynamicAgentExecutor::new(Arc::new(AgentExecutor::new(Arc::new(EchoProvider))));
        let req = request(
            NodeKind::DynamicAgent,
            json!({"promptExpr": "context.task", "modelExpr": "context.model"}),
            json!({"context": {"task": "fix the bug", "model": "claude-sonnet-4-5"}, "answers": {}}),
        );
        let outcome = executor.execute(&req, &sink()).await.unwrap();
        assert_eq!(
            outcome.outputs["response"],
            json!({"prompt": "fix the bug", "model": "claude-sonnet-4-5"})
        );
    }

    #[tokio::test]
    async fn test_dynamic_agent_null_prompt_is_eval_error() {
        let executor =
            DynamicAgentExecutor::new(Arc::new(AgentExecutor::new(Arc::new(EchoProvider))));
        let req = request(
            NodeKind::DynamicAgent,
            json!({"promptExpr": "context.missing"}),
            json!({"context": {}}),
        );
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "EvalError");
    }

    #[tokio::test]
    async fn test_dynamic_command_resolves_and_runs() {
        let executor = DynamicCommandExecutor::new(Arc::new(CommandExecutor::new()));
        let req = request(
            NodeKind::DynamicCommand,
            json!({"commandExpr": "context.cmd"}),
            json!({"context": {"cmd": "echo dyn"}}),
        );
        let outcome = executor.execute(&req, &sink()).await.unwrap();
        assert_eq!(outcome.outputs["stdout"], json!("dyn\n"));
    }
}
