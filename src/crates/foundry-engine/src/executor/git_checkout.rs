//! Git checkout executor
//!
//! Clones a repository ref into the execution workspace. Owner/repo/ref
//! resolve from input ports first, then node config, then the issue context
//! (`issue.owner` / `issue.repo` / `issue.ref`). Idempotent when
//! `skipIfExists` is set and the checkout directory is already present.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::expr::lookup_path;
use foundry_graph::NodeKind;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

const CLONE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_WORKSPACE: &str = "/tmp/foundry-workspaces";

pub struct GitCheckoutExecutor;

impl GitCheckoutExecutor {
    pub fn new() -> Self {
        Self
    }

    fn resolve(request: &ExecRequest, key: &str) -> Option<String> {
        request
            .input_str(key)
            .map(str::to_string)
            .or_else(|| request.config_str(key).map(str::to_string))
            .or_else(|| {
                lookup_path(&request.scope, &format!("issue.{key}"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
    }
}

impl Default for GitCheckoutExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for GitCheckoutExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::GitCheckout
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let owner = Self::resolve(request, "owner").ok_or_else(|| EngineError::PortUnresolved {
            node: request.node.id.clone(),
            port: "owner".to_string(),
        })?;
        let repo = Self::resolve(request, "repo").ok_or_else(|| EngineError::PortUnresolved {
            node: request.node.id.clone(),
            port: "repo".to_string(),
        })?;
        let git_ref = Self::resolve(request, "ref");

        let workspace = request
            .config_str("workspaceDir")
            .unwrap_or(DEFAULT_WORKSPACE);
        let target: PathBuf = PathBuf::from(workspace).join(format!("{owner}-{repo}"));

        if target.exists() && request.config_bool("skipIfExists") {
            activity.emit("checkout-skipped", json!({"path": target.display().to_string()}));
            return Ok(ExecOutcome::new()
                .with_output("path", json!(target.display().to_string())));
        }

        let base = request
            .config_str("baseUrl")
            .unwrap_or("https://github.com");
        let url = format!("{base}/{owner}/{repo}.git");

        tokio::fs::create_dir_all(workspace)
            .await
            .map_err(|e| EngineError::Internal(format!("workspace create failed: {e}")))?;

        let mut command = Command::new("git");
        command.arg("clone").arg("--depth").arg("1");
        if let Some(r) = &git_ref {
            command.arg("--branch").arg(r);
        }
        command.arg(&url).arg(&target).kill_on_drop(true);
        for (key, value) in &request.env {
            command.env(key, value);
        }

        activity.emit("checkout-start", json!({"url": url, "ref": git_ref}));

        let output = tokio::time::timeout(
            Duration::from_secs(CLONE_TIMEOUT_SECS),
            command.output(),
        )
        .await
        .map_err(|_| EngineError::CommandTimeout {
            seconds: CLONE_TIMEOUT_SECS,
        })?
        .map_err(|e| EngineError::Internal(format!("git spawn failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Internal(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        activity.emit("checkout-complete", json!({"path": target.display().to_string()}));
        Ok(ExecOutcome::new().with_output("path", json!(target.display().to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use foundry_graph::PlanNode;
    use serde_json::Map;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn request(config: Value, inputs: Value, scope: Value) -> ExecRequest {
        ExecRequest {
            execution_id: "exec".into(),
            node: PlanNode {
                id: "git".into(),
                kind: NodeKind::GitCheckout,
                config,
            },
            inputs: inputs.as_object().cloned().unwrap_or_else(Map::new),
            scope,
            env: HashMap::new(),
        }
    }

    fn sink() -> ActivitySink {
        ActivitySink::new(Arc::new(EventBus::new()), "exec", "git")
    }

    #[test]
    fn test_resolution_order_inputs_config_context() {
        let req = request(
            json!({"owner": "from-config"}),
            json!({"owner": "from-input"}),
            json!({"issue": {"owner": "from-context"}}),
        );
        assert_eq!(
            GitCheckoutExecutor::resolve(&req, "owner").as_deref(),
            Some("from-input")
        );

        let req = request(
            json!({"owner": "from-config"}),
            json!({}),
            json!({"issue": {"owner": "from-context"}}),
        );
        assert_eq!(
            GitCheckoutExecutor::resolve(&req, "owner").as_deref(),
            Some("from-config")
        );

        let req = request(json!({}), json!({}), json!({"issue": {"owner": "from-context"}}));
        assert_eq!(
            GitCheckoutExecutor::resolve(&req, "owner").as_deref(),
            Some("from-context")
        );
    }

    #[tokio::test]
    async fn test_missing_owner_is_port_unresolved() {
        let executor = GitCheckoutExecutor::new();
        let req = request(json!({}), json!({}), json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "PortUnresolved");
    }

    #[tokio::test]
    async fn test_skip_if_exists_short_circuits() {
        let workspace = tempfile::tempdir().unwrap();
        let target = workspace.path().join("acme-widgets");
        std::fs::create_dir_all(&target).unwrap();

        let executor = GitCheckoutExecutor::new();
        let req = request(
            json!({
                "owner": "acme",
                "repo": "widgets",
                "skipIfExists": true,
                "workspaceDir": workspace.path().display().to_string()
            }),
            json!({}),
            json!({}),
        );
        let outcome = executor.execute(&req, &sink()).await.unwrap();
        assert_eq!(
            outcome.outputs["path"],
            json!(target.display().to_string())
        );
    }
}
