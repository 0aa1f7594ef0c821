//! Per-execution state and step history
//!
//! [`ExecutionState`] is the single unit of persistence for a run: status,
//! current node, per-node port data, the open context map, the append-only
//! step history, question bookkeeping and error/retry accounting. The whole
//! struct serialises to JSON; [`ExecutionState::checkpoint`] and
//! [`ExecutionState::restore`] are the round-trip used by every saver
//! backend.

use crate::status::ExecutionStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of one recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// One entry of the append-only step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: String,
    pub node_id: String,
    pub kind: String,
    pub status: StepStatus,
    pub started_at: String,
    pub completed_at: String,
    pub duration_ms: i64,
    /// Snapshot of the resolved inputs.
    #[serde(default)]
    pub input: Value,
    /// Snapshot of the produced outputs.
    #[serde(default)]
    pub output: Value,
    /// Tokens consumed, for LLM-backed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured last-error of an execution: a stable machine kind plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The persisted state of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub id: String,
    pub workflow_id: String,
    pub project_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    /// nodeId → (portId → value), written only by the interpreter.
    #[serde(default)]
    pub port_data: HashMap<String, Map<String, Value>>,
    /// Open key/value map for user-authored and executor-written data.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub step_history: Vec<StepRecord>,

    // Question-driven flow bookkeeping.
    #[serde(default)]
    pub current_topic_index: usize,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub topic_question_counts: Vec<usize>,
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub skipped_questions: Vec<String>,
    /// Question id the execution is suspended on, when `waiting_user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,

    pub started_at: String,
    pub last_activity_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ExecutionError>,
    #[serde(default)]
    pub retry_count: u32,

    /// Last emitted event sequence number; events resume at `event_seq + 1`.
    #[serde(default)]
    pub event_seq: u64,
    /// Set by `cancel`; observed by the interpreter before each step.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Target status contributed by the end node the run finished through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<String>,
}

impl ExecutionState {
    /// Fresh state in `pending`, with a v4 id.
    pub fn new(workflow_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            project_id: project_id.into(),
            status: ExecutionStatus::Pending,
            current_node_id: None,
            port_data: HashMap::new(),
            context: Map::new(),
            step_history: Vec::new(),
            current_topic_index: 0,
            current_question_index: 0,
            topic_question_counts: Vec::new(),
            answers: Map::new(),
            skipped_questions: Vec::new(),
            pending_question: None,
            started_at: now.clone(),
            last_activity_at: now,
            paused_at: None,
            completed_at: None,
            last_error: None,
            retry_count: 0,
            event_seq: 0,
            cancel_requested: false,
            completion_status: None,
        }
    }

    /// Refresh `last_activity_at`.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now().to_rfc3339();
    }

    /// Move to `next` if the state machine permits it.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.touch();
        match next {
            ExecutionStatus::Paused => self.paused_at = Some(Utc::now().to_rfc3339()),
            ExecutionStatus::Running => self.paused_at = None,
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                self.completed_at = Some(Utc::now().to_rfc3339())
            }
            _ => {}
        }
        true
    }

    /// Write one node's outputs into the port-data map.
    pub fn write_ports(&mut self, node_id: &str, outputs: Map<String, Value>) {
        let entry = self.port_data.entry(node_id.to_string()).or_default();
        for (port, value) in outputs {
            entry.insert(port, value);
        }
    }

    /// Read one port's value, if produced.
    pub fn port_value(&self, node_id: &str, port: &str) -> Option<&Value> {
        self.port_data.get(node_id)?.get(port)
    }

    /// Serialise the full state (the checkpoint blob).
    pub fn checkpoint(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restore a state from its checkpoint blob.
    pub fn restore(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }

    /// Next event sequence number, advancing the persisted counter.
    pub fn next_seq(&mut self) -> u64 {
        self.event_seq += 1;
        self.event_seq
    }
}
