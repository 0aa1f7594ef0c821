//! The immutable, executable plan produced by the compiler
//!
//! A [`Plan`] is what the interpreter drives: the executable node list
//! (virtual trigger/end nodes excluded), adjacency in declared edge order,
//! the typed port wiring, the per-node transition policy, and the end-node
//! bookkeeping used to map a finished run onto a target status.
//!
//! Plans are plain data — fully serializable so they can be persisted for
//! remote container runs and round-tripped through webhooks.

use crate::registry::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Sentinel meaning "terminate this execution".
///
/// Produced by transitions whose target is an end node or whose source has no
/// outgoing edges.
pub const END: &str = "__end__";

/// Descriptor of one executable node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub config: Value,
}

/// Source endpoint feeding a target input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    pub node: String,
    pub port: String,
}

/// One `case → target` arm of a switch transition, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: String,
    pub target: String,
}

/// The successor policy attached to a node.
///
/// Targets are real node ids; an end node's id is a valid target and resolves
/// to the [`END`] sentinel at runtime (the sentinel string itself is also
/// accepted, for function transitions that return it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransitionSpec {
    /// Unconditional next.
    Simple { target: String },
    /// Context-path truthiness picks one of two targets.
    #[serde(rename_all = "camelCase")]
    Conditional {
        expr: String,
        then_target: String,
        else_target: String,
    },
    /// Stringified value match over declared cases.
    Switch {
        expr: String,
        cases: Vec<SwitchCase>,
        default: String,
    },
    /// Opaque expression evaluated in the restricted sandbox; the result is
    /// the target node id. Failures downgrade to [`END`].
    Function { source: String },
}

/// Immutable output of [`compile`](crate::compile::compile).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub workflow_id: String,
    pub project_id: String,
    /// Executable node descriptors, in document order. Trigger and end nodes
    /// are virtual and excluded.
    pub executable: Vec<PlanNode>,
    /// Node id → outgoing targets, in declared edge order.
    pub adjacency: HashMap<String, Vec<String>>,
    /// Target node → (input port → source endpoint).
    pub port_mappings: HashMap<String, HashMap<String, PortRef>>,
    /// Per-node successor policy. Every executable node has an entry (the
    /// compiler materialises the adjacency fallback).
    pub transitions: HashMap<String, TransitionSpec>,
    /// End node id → optional target status.
    pub end_mappings: HashMap<String, Option<String>>,
    /// Source node id → the end node its fallback transition reaches.
    pub end_targets: HashMap<String, String>,
    /// Trigger id → (output port → value) seeded from the initial context.
    pub initial_port_data: HashMap<String, HashMap<String, Value>>,
    /// First executable node (the trigger's first declared successor).
    pub entry: Option<String>,
    /// Image for remote execution, copied from the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
}

impl Plan {
    /// Find an executable node descriptor.
    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.executable.iter().find(|n| n.id == id)
    }

    /// Whether `id` names an end node of this plan.
    pub fn is_end(&self, id: &str) -> bool {
        id == END || self.end_mappings.contains_key(id)
    }

    /// The target status contributed by an end node, if any.
    pub fn target_status(&self, end_id: &str) -> Option<&str> {
        self.end_mappings.get(end_id).and_then(|s| s.as_deref())
    }
}
