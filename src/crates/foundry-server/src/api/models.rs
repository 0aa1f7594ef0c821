//! Request/response DTOs for the HTTP surface

use crate::api::error::{ApiError, ApiResult};
use crate::db::models::{Automation, AutomationTransition, TransitionCondition, TriggerKind, WorkflowRow};
use foundry_state::{ExecutionState, StepRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_array")]
    pub nodes: Value,
    #[serde(default = "empty_array")]
    pub edges: Value,
    #[serde(default)]
    pub initial_context: Option<Map<String, Value>>,
    /// Plaintext environment; encrypted server-side before persisting.
    #[serde(default)]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub remote_execution: bool,
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

impl CreateWorkflowRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("workflow name must not be empty".into()));
        }
        if self.project_id.trim().is_empty() {
            return Err(ApiError::BadRequest("projectId must not be empty".into()));
        }
        if !self.nodes.is_array() || !self.edges.is_array() {
            return Err(ApiError::BadRequest("nodes and edges must be arrays".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Option<Value>,
    #[serde(default)]
    pub edges: Option<Value>,
    #[serde(default)]
    pub initial_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub remote_execution: Option<bool>,
}

impl UpdateWorkflowRequest {
    pub fn has_updates(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.nodes.is_some()
            || self.edges.is_some()
            || self.initial_context.is_some()
            || self.environment.is_some()
            || self.docker_image.is_some()
            || self.remote_execution.is_some()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResponse {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Value,
    pub edges: Value,
    pub initial_context: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    pub remote_execution: bool,
    /// Secrets are write-only; the response only reports their presence.
    pub has_environment: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowResponse {
    pub fn from_row(row: WorkflowRow) -> ApiResult<Self> {
        let nodes = serde_json::from_str(&row.nodes)
            .map_err(|e| ApiError::Internal(format!("stored nodes are corrupt: {e}")))?;
        let edges = serde_json::from_str(&row.edges)
            .map_err(|e| ApiError::Internal(format!("stored edges are corrupt: {e}")))?;
        let initial_context = serde_json::from_str(&row.initial_context)
            .map_err(|e| ApiError::Internal(format!("stored context is corrupt: {e}")))?;
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            nodes,
            edges,
            initial_context,
            docker_image: row.docker_image,
            remote_execution: row.remote_execution != 0,
            has_environment: row.encrypted_env.is_some(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Body of the standalone validate endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateWorkflowRequest {
    #[serde(default = "empty_array")]
    pub nodes: Value,
    #[serde(default = "empty_array")]
    pub edges: Value,
    #[serde(default)]
    pub initial_context: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub initial_context: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionResponse {
    pub execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub id: String,
    pub workflow_id: String,
    pub project_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    pub port_data: Value,
    pub context: Value,
    pub answers: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Value>,
    pub retry_count: u32,
    pub started_at: String,
    pub last_activity_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl ExecutionResponse {
    pub fn from_state(state: &ExecutionState) -> Self {
        Self {
            id: state.id.clone(),
            workflow_id: state.workflow_id.clone(),
            project_id: state.project_id.clone(),
            status: state.status.as_str().to_string(),
            current_node_id: state.current_node_id.clone(),
            port_data: serde_json::to_value(&state.port_data).unwrap_or(Value::Null),
            context: Value::Object(state.context.clone()),
            answers: Value::Object(state.answers.clone()),
            pending_question: state.pending_question.clone(),
            completion_status: state.completion_status.clone(),
            last_error: state
                .last_error
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok()),
            retry_count: state.retry_count,
            started_at: state.started_at.clone(),
            last_activity_at: state.last_activity_at.clone(),
            paused_at: state.paused_at.clone(),
            completed_at: state.completed_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepHistoryResponse {
    pub execution_id: String,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_id: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipQuestionRequest {
    pub question_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStepRequest {
    pub node_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub condition: TransitionCondition,
    #[serde(default)]
    pub custom_expression: Option<String>,
    pub next_status: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRequest {
    pub project_id: String,
    pub name: String,
    pub trigger_kind: TriggerKind,
    #[serde(default)]
    pub trigger_status: Option<String>,
    #[serde(default)]
    pub button_label: Option<String>,
    pub workflow_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub transitions: Vec<TransitionPayload>,
}

fn default_true() -> bool {
    true
}

impl CreateAutomationRequest {
    pub fn into_automation(self, id: String) -> ApiResult<Automation> {
        let automation = Automation {
            id,
            project_id: self.project_id,
            name: self.name,
            trigger_kind: self.trigger_kind,
            trigger_status: self.trigger_status,
            button_label: self.button_label,
            workflow_id: self.workflow_id,
            enabled: self.enabled,
            priority: self.priority,
            transitions: self
                .transitions
                .into_iter()
                .map(|t| AutomationTransition {
                    id: String::new(),
                    condition: t.condition,
                    custom_expression: t.custom_expression,
                    next_status: t.next_status,
                    priority: t.priority,
                })
                .collect(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        automation.validate().map_err(ApiError::BadRequest)?;
        if automation.workflow_id.trim().is_empty() {
            return Err(ApiError::BadRequest("workflowId is required".into()));
        }
        Ok(automation)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTriggerRequest {
    pub automation_id: String,
    pub issue_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub project_id: String,
    pub issue_id: String,
    pub previous_status: String,
    pub new_status: String,
    #[serde(default)]
    pub issue: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_workflow_request_validation() {
        let req: CreateWorkflowRequest = serde_json::from_value(json!({
            "projectId": "proj",
            "name": "demo"
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let req: CreateWorkflowRequest = serde_json::from_value(json!({
            "projectId": "proj",
            "name": "   "
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_automation_request_requires_workflow_and_invariants() {
        let req: CreateAutomationRequest = serde_json::from_value(json!({
            "projectId": "proj",
            "name": "auto",
            "triggerKind": "statusEnter",
            "workflowId": "wf"
        }))
        .unwrap();
        // statusEnter without triggerStatus violates the invariant
        assert!(req.into_automation("a1".into()).is_err());

        let req: CreateAutomationRequest = serde_json::from_value(json!({
            "projectId": "proj",
            "name": "auto",
            "triggerKind": "statusEnter",
            "triggerStatus": "InProgress",
            "workflowId": "wf",
            "transitions": [
                {"condition": "success", "nextStatus": "Review"}
            ]
        }))
        .unwrap();
        let automation = req.into_automation("a1".into()).unwrap();
        assert_eq!(automation.transitions.len(), 1);
    }
}
