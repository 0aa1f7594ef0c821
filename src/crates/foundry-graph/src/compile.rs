//! Graph compiler: workflow document → immutable [`Plan`]
//!
//! Compilation is pure. It re-runs validation, then builds adjacency
//! (preserving declared edge order), port mappings, per-node transitions
//! (materialising the adjacency fallback), end mappings/targets and the
//! trigger's initial port data. Failure is a list of
//! [`ValidationIssue`](crate::issue::ValidationIssue)s — the compiler never
//! panics and never partially succeeds.

use crate::document::WorkflowDocument;
use crate::expr::Expr;
use crate::issue::ValidationIssue;
use crate::plan::{Plan, PlanNode, PortRef, SwitchCase, TransitionSpec, END};
use crate::registry::{NodeKind, Registry};
use crate::validate::validate;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Parse a node's `transition` config block into a [`TransitionSpec`].
///
/// Wire forms:
///
/// ```json
/// {"type": "simple", "target": "node-b"}
/// {"type": "conditional", "expr": "context.ok", "then": "a", "else": "b"}
/// {"type": "switch", "expr": "context.kind", "cases": {"x": "a"}, "default": "b"}
/// {"type": "function", "source": "..."}
/// ```
pub fn parse_transition(block: &Value) -> std::result::Result<TransitionSpec, String> {
    let kind = block
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "transition block has no 'type'".to_string())?;

    let field = |key: &str| -> std::result::Result<String, String> {
        block
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("{kind} transition is missing '{key}'"))
    };

    match kind {
        "simple" => Ok(TransitionSpec::Simple {
            target: field("target")?,
        }),
        "conditional" => Ok(TransitionSpec::Conditional {
            expr: field("expr")?,
            then_target: field("then")?,
            else_target: field("else")?,
        }),
        "switch" => {
            let cases = block
                .get("cases")
                .and_then(Value::as_object)
                .ok_or_else(|| "switch transition is missing 'cases'".to_string())?
                .iter()
                .map(|(value, target)| {
                    target
                        .as_str()
                        .map(|t| SwitchCase {
                            value: value.clone(),
                            target: t.to_string(),
                        })
                        .ok_or_else(|| format!("switch case '{value}' target must be a string"))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(TransitionSpec::Switch {
                expr: field("expr")?,
                cases,
                default: field("default")?,
            })
        }
        "function" => Ok(TransitionSpec::Function {
            source: field("source")?,
        }),
        other => Err(format!("unknown transition type '{other}'")),
    }
}

/// Compile a workflow document with a candidate initial context.
pub fn compile(
    doc: &WorkflowDocument,
    initial_context: &Map<String, Value>,
    registry: &Registry,
) -> std::result::Result<Plan, Vec<ValidationIssue>> {
    let issues = validate(doc, registry);
    if !issues.is_empty() {
        return Err(issues);
    }

    let executable: Vec<PlanNode> = doc
        .nodes
        .iter()
        .filter(|n| !n.kind.is_virtual())
        .map(|n| PlanNode {
            id: n.id.clone(),
            kind: n.kind,
            config: n.config.clone(),
        })
        .collect();

    // Adjacency in declared edge order; every node gets an entry so that
    // transition resolution is a plain lookup.
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for node in &doc.nodes {
        adjacency.insert(node.id.clone(), Vec::new());
    }
    for edge in &doc.edges {
        adjacency
            .get_mut(&edge.source)
            .expect("validated edge source")
            .push(edge.target.clone());
    }

    // Port wiring, from edges where both endpoints name ports.
    let mut port_mappings: HashMap<String, HashMap<String, PortRef>> = HashMap::new();
    for edge in &doc.edges {
        if let (Some(sp), Some(tp)) = (&edge.source_port, &edge.target_port) {
            port_mappings
                .entry(edge.target.clone())
                .or_default()
                .insert(
                    tp.clone(),
                    PortRef {
                        node: edge.source.clone(),
                        port: sp.clone(),
                    },
                );
        }
    }

    let mut end_mappings: HashMap<String, Option<String>> = HashMap::new();
    for node in doc.nodes.iter().filter(|n| n.kind == NodeKind::End) {
        end_mappings.insert(
            node.id.clone(),
            node.config_str("targetStatus").map(str::to_string),
        );
    }

    let mut transitions: HashMap<String, TransitionSpec> = HashMap::new();
    let mut end_targets: HashMap<String, String> = HashMap::new();
    for node in doc.nodes.iter().filter(|n| !n.kind.is_virtual()) {
        let spec = match node.transition() {
            Some(block) => {
                // Validation guarantees the block parses; function sources
                // are checked here and downgraded when unparseable.
                let spec = parse_transition(block).expect("validated transition block");
                if let TransitionSpec::Function { source } = &spec {
                    if let Err(e) = Expr::parse(source) {
                        tracing::warn!(
                            node = %node.id,
                            error = %e,
                            "function transition does not parse; downgrading to END"
                        );
                        TransitionSpec::Simple {
                            target: END.to_string(),
                        }
                    } else {
                        spec
                    }
                } else {
                    spec
                }
            }
            None => {
                let target = adjacency
                    .get(&node.id)
                    .and_then(|t| t.first())
                    .cloned()
                    .unwrap_or_else(|| END.to_string());
                TransitionSpec::Simple { target }
            }
        };
        if let TransitionSpec::Simple { target } = &spec {
            if end_mappings.contains_key(target) {
                end_targets.insert(node.id.clone(), target.clone());
            }
        }
        transitions.insert(node.id.clone(), spec);
    }

    // Seed the trigger's declared outputs from the initial context.
    let mut initial_port_data: HashMap<String, HashMap<String, Value>> = HashMap::new();
    let mut entry = None;
    if let Some(trigger) = doc.trigger() {
        let mut seeded = HashMap::new();
        for (port, _ty) in trigger.declared_outputs() {
            if let Some(value) = initial_context.get(&port) {
                seeded.insert(port, value.clone());
            }
        }
        initial_port_data.insert(trigger.id.clone(), seeded);
        entry = adjacency.get(&trigger.id).and_then(|t| t.first()).cloned();
    }

    Ok(Plan {
        workflow_id: doc.id.clone(),
        project_id: doc.project_id.clone(),
        executable,
        adjacency,
        port_mappings,
        transitions,
        end_mappings,
        end_targets,
        initial_port_data,
        entry,
        docker_image: doc.docker_image.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(nodes: Value, edges: Value, initial: Value) -> (WorkflowDocument, Map<String, Value>) {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "id": "wf-1",
            "projectId": "proj-1",
            "name": "test",
            "nodes": nodes,
            "edges": edges,
            "initialContext": initial,
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z",
        }))
        .unwrap();
        let initial = doc.initial_context.clone();
        (doc, initial)
    }

    fn linear() -> (WorkflowDocument, Map<String, Value>) {
        doc(
            json!([
                {"id": "t", "kind": "trigger", "config": {"outputs": [{"id": "prompt", "type": "string"}]}},
                {"id": "l", "kind": "llm", "config": {"model": "gpt-4o", "userPrompt": "${prompt}"}},
                {"id": "e", "kind": "end", "config": {"targetStatus": "Done"}}
            ]),
            json!([
                {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "l", "targetPort": "prompt"},
                {"id": "e2", "source": "l", "target": "e"}
            ]),
            json!({"prompt": "hi"}),
        )
    }

    #[test]
    fn test_compile_linear_plan() {
        let (d, ctx) = linear();
        let plan = compile(&d, &ctx, &Registry::new()).unwrap();

        assert_eq!(plan.executable.len(), 1);
        assert_eq!(plan.executable[0].id, "l");
        assert_eq!(plan.entry.as_deref(), Some("l"));
        assert_eq!(plan.adjacency["l"], vec!["e".to_string()]);
        assert_eq!(
            plan.port_mappings["l"]["prompt"],
            PortRef { node: "t".into(), port: "prompt".into() }
        );
        assert_eq!(
            plan.transitions["l"],
            TransitionSpec::Simple { target: "e".into() }
        );
        assert_eq!(plan.end_targets["l"], "e");
        assert_eq!(plan.end_mappings["e"], Some("Done".to_string()));
        assert_eq!(plan.initial_port_data["t"]["prompt"], json!("hi"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let (d, ctx) = linear();
        let registry = Registry::new();
        let a = compile(&d, &ctx, &registry).unwrap();
        let b = compile(&d, &ctx, &registry).unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_compile_rejects_invalid_document() {
        let (d, ctx) = doc(json!([]), json!([]), json!({}));
        let err = compile(&d, &ctx, &Registry::new()).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_adjacency_fallback_uses_first_declared_edge() {
        let (d, ctx) = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {"command": "true"}},
                {"id": "b", "kind": "command", "config": {"command": "true"}},
                {"id": "c", "kind": "command", "config": {"command": "true"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "c"},
                {"id": "e3", "source": "a", "target": "b"},
                {"id": "e4", "source": "b", "target": "e"},
                {"id": "e5", "source": "c", "target": "e"}
            ]),
            json!({}),
        );
        let plan = compile(&d, &ctx, &Registry::new()).unwrap();
        assert_eq!(
            plan.transitions["a"],
            TransitionSpec::Simple { target: "c".into() }
        );
    }

    #[test]
    fn test_declared_conditional_transition() {
        let (d, ctx) = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "ev", "kind": "eval", "config": {
                    "source": "true",
                    "transition": {"type": "conditional", "expr": "context.branch == 'A'", "then": "a", "else": "b"}
                }},
                {"id": "a", "kind": "command", "config": {"command": "echo A"}},
                {"id": "b", "kind": "command", "config": {"command": "echo B"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "ev"},
                {"id": "e2", "source": "ev", "target": "a"},
                {"id": "e3", "source": "ev", "target": "b"},
                {"id": "e4", "source": "a", "target": "e"},
                {"id": "e5", "source": "b", "target": "e"}
            ]),
            json!({}),
        );
        let plan = compile(&d, &ctx, &Registry::new()).unwrap();
        assert_eq!(
            plan.transitions["ev"],
            TransitionSpec::Conditional {
                expr: "context.branch == 'A'".into(),
                then_target: "a".into(),
                else_target: "b".into(),
            }
        );
    }

    #[test]
    fn test_unparseable_function_transition_downgrades_to_end() {
        let (d, ctx) = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {
                    "command": "true",
                    "transition": {"type": "function", "source": "@@@ not an expression"}
                }},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "e"}
            ]),
            json!({}),
        );
        let plan = compile(&d, &ctx, &Registry::new()).unwrap();
        assert_eq!(
            plan.transitions["a"],
            TransitionSpec::Simple { target: END.into() }
        );
    }

    #[test]
    fn test_plan_round_trips_through_json() {
        let (d, ctx) = linear();
        let plan = compile(&d, &ctx, &Registry::new()).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            serde_json::to_value(&back).unwrap()
        );
    }
}
