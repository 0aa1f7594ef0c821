//! Eval node executor
//!
//! Evaluates the node's `source` expression in the restricted sandbox. The
//! result must be an object; its entries are merged into the execution
//! context and also exposed on the `result` output port.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::{Expr, NodeKind};
use serde_json::Value;

pub struct EvalExecutor;

impl EvalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EvalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for EvalExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Eval
    }

    async fn execute(&self, request: &ExecRequest, _activity: &ActivitySink) -> Result<ExecOutcome> {
        let source = request
            .config_str("source")
            .ok_or_else(|| EngineError::Eval("eval node has no source".to_string()))?;

        let expr = Expr::parse(source).map_err(|e| EngineError::Eval(e.to_string()))?;
        let value = expr.eval(&request.scope);

        let Value::Object(updates) = value else {
            return Err(EngineError::Eval(format!(
                "eval result must be an object, got {value}"
            )));
        };

        let mut outcome = ExecOutcome::new().with_output("result", Value::Object(updates.clone()));
        outcome.context_updates = updates;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use foundry_graph::PlanNode;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn request(source: &str, scope: Value) -> ExecRequest {
        ExecRequest {
            execution_id: "exec".into(),
            node: PlanNode {
                id: "ev".into(),
                kind: NodeKind::Eval,
                config: json!({"source": source}),
            },
            inputs: Map::new(),
            scope,
            env: HashMap::new(),
        }
    }

    fn sink() -> ActivitySink {
        ActivitySink::new(Arc::new(EventBus::new()), "exec", "ev")
    }

    #[tokio::test]
    async fn test_eval_merges_object_into_context() {
        let executor = EvalExecutor::new();
        let req = request("{branch: 'A', n: context.count}", json!({"context": {"count": 2}}));
        let outcome = executor.execute(&req, &sink()).await.unwrap();
        assert_eq!(outcome.context_updates, *json!({"branch": "A", "n": 2}).as_object().unwrap());
        assert_eq!(outcome.outputs["result"], json!({"branch": "A", "n": 2}));
    }

    #[tokio::test]
    async fn test_eval_non_object_result_fails() {
        let executor = EvalExecutor::new();
        let req = request("42", json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "EvalError");
    }

    #[tokio::test]
    async fn test_eval_parse_failure_is_eval_error() {
        let executor = EvalExecutor::new();
        let req = request("@@@", json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "EvalError");
    }
}
