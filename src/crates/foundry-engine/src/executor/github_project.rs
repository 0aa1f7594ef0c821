//! Project-board update executor
//!
//! Pushes a batch of item updates to the external project-tracking API and
//! outputs the reconciled items. Failures surface as `ProjectApiError`.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use crate::traits::ProjectTracker;
use async_trait::async_trait;
use foundry_graph::NodeKind;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct GithubProjectExecutor {
    tracker: Arc<dyn ProjectTracker>,
}

impl GithubProjectExecutor {
    pub fn new(tracker: Arc<dyn ProjectTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl NodeExecutor for GithubProjectExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::GithubProject
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let updates: Vec<Value> = request
            .input("updates")
            .or_else(|| request.node.config.get("updates"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let project_id = request
            .config_str("projectId")
            .map(str::to_string)
            .or_else(|| {
                request
                    .scope
                    .get("projectId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| EngineError::ProjectApi("no project id in config or context".into()))?;

        activity.emit("project-update", json!({"count": updates.len()}));

        let items = self
            .tracker
            .apply_updates(&project_id, &updates)
            .await
            .map_err(EngineError::ProjectApi)?;

        Ok(ExecOutcome::new().with_output("items", Value::Array(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use foundry_graph::PlanNode;
    use parking_lot::Mutex;
    use serde_json::Map;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingTracker {
        applied: Mutex<Vec<(String, Vec<Value>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ProjectTracker for RecordingTracker {
        async fn apply_updates(
            &self,
            project_id: &str,
            updates: &[Value],
        ) -> std::result::Result<Vec<Value>, String> {
            if self.fail {
                return Err("board unavailable".to_string());
            }
            self.applied
                .lock()
                .push((project_id.to_string(), updates.to_vec()));
            Ok(updates.to_vec())
        }

        async fn set_issue_status(
            &self,
            _project_id: &str,
            _issue_id: &str,
            _status: &str,
        ) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn request(config: Value, inputs: Value, scope: Value) -> ExecRequest {
        ExecRequest {
            execution_id: "exec".into(),
            node: PlanNode {
                id: "proj".into(),
                kind: NodeKind::GithubProject,
                config,
            },
            inputs: inputs.as_object().cloned().unwrap_or_else(Map::new),
            scope,
            env: HashMap::new(),
        }
    }

    fn sink() -> ActivitySink {
        ActivitySink::new(Arc::new(EventBus::new()), "exec", "proj")
    }

    #[tokio::test]
    async fn test_updates_flow_to_tracker() {
        let tracker = Arc::new(RecordingTracker::default());
        let executor = GithubProjectExecutor::new(tracker.clone());
        let req = request(
            json!({"projectId": "proj-1"}),
            json!({"updates": [{"itemId": "i1", "status": "Review"}]}),
            json!({}),
        );
        let outcome = executor.execute(&req, &sink()).await.unwrap();
        assert_eq!(outcome.outputs["items"], json!([{"itemId": "i1", "status": "Review"}]));
        assert_eq!(tracker.applied.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_tracker_failure_is_project_api_error() {
        let executor = GithubProjectExecutor::new(Arc::new(RecordingTracker {
            fail: true,
            ..Default::default()
        }));
        let req = request(json!({"projectId": "proj-1"}), json!({}), json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "ProjectApiError");
    }
}
