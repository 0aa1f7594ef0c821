//! Persisted workflow document model
//!
//! The editable graph as stored by the backend and exchanged with the canvas:
//! nodes, edges, initial context, the encrypted environment blob and the
//! optional remote-execution image. Field names follow the JSON wire format
//! (camelCase).

use crate::registry::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canvas position of a node. Opaque to the engine, round-tripped for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One node record in a workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    /// Kind-specific configuration (prompt, command, transition block, ...).
    #[serde(default)]
    pub config: Value,
}

impl NodeRecord {
    /// Fetch a string field from the node config.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// The node's declared transition block, if any.
    pub fn transition(&self) -> Option<&Value> {
        self.config.get("transition")
    }

    /// Declared trigger outputs: `config.outputs = [{id, type}]`.
    pub fn declared_outputs(&self) -> Vec<(String, String)> {
        self.config
            .get("outputs")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|o| {
                        let id = o.get("id").and_then(Value::as_str)?;
                        let ty = o.get("type").and_then(Value::as_str).unwrap_or("any");
                        Some((id.to_string(), ty.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One edge record. `sourcePort`/`targetPort` are present when the endpoints
/// declare ports in the registry; edges without ports carry control flow only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
}

/// The persisted, editable workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub initial_context: Map<String, Value>,
    /// Opaque AEAD blob holding secrets injected at execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_environment: Option<String>,
    /// Image used when the workflow runs remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowDocument {
    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The unique trigger node, when exactly one exists.
    pub fn trigger(&self) -> Option<&NodeRecord> {
        let mut triggers = self.nodes.iter().filter(|n| n.kind == NodeKind::Trigger);
        let first = triggers.next();
        if triggers.next().is_some() {
            return None;
        }
        first
    }

    /// Outgoing edges of a node, in declared order.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeRecord> {
        self.edges.iter().filter(move |e| e.source == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_from(nodes: Value, edges: Value) -> WorkflowDocument {
        serde_json::from_value(json!({
            "id": "wf-1",
            "projectId": "proj-1",
            "name": "test",
            "nodes": nodes,
            "edges": edges,
            "initialContext": {},
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn test_document_roundtrip() {
        let doc = doc_from(
            json!([
                {"id": "t", "kind": "trigger", "config": {"outputs": [{"id": "prompt", "type": "string"}]}},
                {"id": "l", "kind": "llm", "config": {"model": "gpt-4o"}},
                {"id": "e", "kind": "end", "config": {"targetStatus": "Done"}}
            ]),
            json!([
                {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "l", "targetPort": "prompt"},
                {"id": "e2", "source": "l", "target": "e"}
            ]),
        );
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.trigger().unwrap().id, "t");
        assert_eq!(
            doc.trigger().unwrap().declared_outputs(),
            vec![("prompt".to_string(), "string".to_string())]
        );
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["nodes"][0]["kind"], json!("trigger"));
        assert_eq!(back["edges"][0]["sourcePort"], json!("prompt"));
    }

    #[test]
    fn test_trigger_is_none_when_ambiguous() {
        let doc = doc_from(
            json!([
                {"id": "t1", "kind": "trigger"},
                {"id": "t2", "kind": "trigger"}
            ]),
            json!([]),
        );
        assert!(doc.trigger().is_none());
    }

    #[test]
    fn test_edges_from_preserves_declared_order() {
        let doc = doc_from(
            json!([
                {"id": "a", "kind": "command", "config": {"command": "true"}},
                {"id": "b", "kind": "command", "config": {"command": "true"}},
                {"id": "c", "kind": "command", "config": {"command": "true"}}
            ]),
            json!([
                {"id": "e1", "source": "a", "target": "c"},
                {"id": "e2", "source": "a", "target": "b"}
            ]),
        );
        let targets: Vec<_> = doc.edges_from("a").map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["c", "b"]);
    }
}
