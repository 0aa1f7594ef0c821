//! Database row types and domain conversions

use crate::db::error::DatabaseError;
use foundry_graph::WorkflowDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Stored workflow row; the graph document is JSON in `nodes`/`edges`.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub nodes: String,
    pub edges: String,
    pub initial_context: String,
    pub encrypted_env: Option<String>,
    pub docker_image: Option<String>,
    pub remote_execution: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowRow {
    /// Rehydrate the persisted document.
    pub fn to_document(&self) -> Result<WorkflowDocument, DatabaseError> {
        let nodes: Value = serde_json::from_str(&self.nodes)
            .map_err(|e| DatabaseError::Encoding(e.to_string()))?;
        let edges: Value = serde_json::from_str(&self.edges)
            .map_err(|e| DatabaseError::Encoding(e.to_string()))?;
        let initial_context: Value = serde_json::from_str(&self.initial_context)
            .map_err(|e| DatabaseError::Encoding(e.to_string()))?;

        serde_json::from_value(serde_json::json!({
            "id": self.id,
            "projectId": self.project_id,
            "name": self.name,
            "description": self.description,
            "nodes": nodes,
            "edges": edges,
            "initialContext": initial_context,
            "encryptedEnvironment": self.encrypted_env,
            "dockerImage": self.docker_image,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        }))
        .map_err(|e| DatabaseError::Encoding(e.to_string()))
    }

    pub fn is_remote(&self) -> bool {
        self.remote_execution != 0
    }
}

/// How an automation is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    StatusEnter,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::StatusEnter => "status_enter",
            TriggerKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_enter" => Some(TriggerKind::StatusEnter),
            "manual" => Some(TriggerKind::Manual),
            _ => None,
        }
    }
}

/// Condition attached to an automation transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionCondition {
    Success,
    Failure,
    Custom,
}

impl TransitionCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCondition::Success => "success",
            TransitionCondition::Failure => "failure",
            TransitionCondition::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(TransitionCondition::Success),
            "failure" => Some(TransitionCondition::Failure),
            "custom" => Some(TransitionCondition::Custom),
            _ => None,
        }
    }
}

/// One status transition rule of an automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationTransition {
    pub id: String,
    pub condition: TransitionCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_expression: Option<String>,
    pub next_status: String,
    pub priority: i64,
}

/// A persisted automation rule with its nested transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub trigger_kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label: Option<String>,
    pub workflow_id: String,
    pub enabled: bool,
    pub priority: i64,
    #[serde(default)]
    pub transitions: Vec<AutomationTransition>,
    pub created_at: String,
    pub updated_at: String,
}

impl Automation {
    /// `statusEnter ⇒ triggerStatus set; manual ⇒ buttonLabel set`.
    pub fn validate(&self) -> Result<(), String> {
        match self.trigger_kind {
            TriggerKind::StatusEnter if self.trigger_status.is_none() => {
                Err("statusEnter automations require triggerStatus".to_string())
            }
            TriggerKind::Manual if self.button_label.is_none() => {
                Err("manual automations require buttonLabel".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AutomationRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub trigger_kind: String,
    pub trigger_status: Option<String>,
    pub button_label: Option<String>,
    pub workflow_id: String,
    pub enabled: i64,
    pub priority: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl AutomationRow {
    pub fn into_automation(self, transitions: Vec<AutomationTransition>) -> Result<Automation, DatabaseError> {
        let trigger_kind = TriggerKind::parse(&self.trigger_kind)
            .ok_or_else(|| DatabaseError::Encoding(format!("bad trigger kind '{}'", self.trigger_kind)))?;
        Ok(Automation {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            trigger_kind,
            trigger_status: self.trigger_status,
            button_label: self.button_label,
            workflow_id: self.workflow_id,
            enabled: self.enabled != 0,
            priority: self.priority,
            transitions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransitionRow {
    pub id: String,
    pub automation_id: String,
    pub condition: String,
    pub custom_expression: Option<String>,
    pub next_status: String,
    pub priority: i64,
}

impl TransitionRow {
    pub fn into_transition(self) -> Result<AutomationTransition, DatabaseError> {
        let condition = TransitionCondition::parse(&self.condition)
            .ok_or_else(|| DatabaseError::Encoding(format!("bad condition '{}'", self.condition)))?;
        Ok(AutomationTransition {
            id: self.id,
            condition,
            custom_expression: self.custom_expression,
            next_status: self.next_status,
            priority: self.priority,
        })
    }
}

/// Per-issue automation lock row.
#[derive(Debug, Clone, FromRow)]
pub struct AutomationLock {
    pub project_id: String,
    pub issue_id: String,
    pub execution_id: String,
    pub acquired_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_invariants() {
        let mut automation = Automation {
            id: "a".into(),
            project_id: "p".into(),
            name: "auto".into(),
            trigger_kind: TriggerKind::StatusEnter,
            trigger_status: None,
            button_label: None,
            workflow_id: "wf".into(),
            enabled: true,
            priority: 0,
            transitions: vec![],
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        assert!(automation.validate().is_err());
        automation.trigger_status = Some("InProgress".into());
        assert!(automation.validate().is_ok());

        automation.trigger_kind = TriggerKind::Manual;
        assert!(automation.validate().is_err());
        automation.button_label = Some("Run".into());
        assert!(automation.validate().is_ok());
    }

    #[test]
    fn test_workflow_row_to_document() {
        let row = WorkflowRow {
            id: "wf".into(),
            project_id: "proj".into(),
            name: "demo".into(),
            description: None,
            nodes: r#"[{"id": "t", "kind": "trigger"}]"#.into(),
            edges: "[]".into(),
            initial_context: "{}".into(),
            encrypted_env: None,
            docker_image: Some("runner:1".into()),
            remote_execution: 1,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        let doc = row.to_document().unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.docker_image.as_deref(), Some("runner:1"));
        assert!(row.is_remote());
    }
}
