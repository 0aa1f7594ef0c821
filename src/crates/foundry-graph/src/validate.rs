//! Workflow document validation
//!
//! [`validate`] walks a document and reports every structural problem it can
//! find: graph-shape issues (triggers, ends, unknown endpoints), typed-port
//! incompatibilities against the registry, missing per-kind configuration,
//! unreachable nodes, and cycles with no forward path to an end node
//! (Tarjan SCC condensation, then terminal reachability).
//!
//! Validation never mutates and never fails — it returns a (possibly empty)
//! issue list.

use crate::document::{EdgeRecord, NodeRecord, WorkflowDocument};
use crate::expr::Expr;
use crate::issue::{IssueCode, ValidationIssue};
use crate::registry::{NodeKind, PortType, Registry};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Validate a workflow document against the port registry.
pub fn validate(doc: &WorkflowDocument, registry: &Registry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if doc.nodes.is_empty() {
        issues.push(ValidationIssue::new(IssueCode::EmptyGraph, "workflow has no nodes"));
        return issues;
    }

    check_node_ids(doc, &mut issues);
    check_node_population(doc, &mut issues);
    check_edges(doc, registry, &mut issues);
    check_configs(doc, &mut issues);
    check_transitions(doc, &mut issues);

    // Graph-shape analysis only makes sense on a structurally sound document.
    if issues.is_empty() {
        check_reachability(doc, &mut issues);
        check_dead_cycles(doc, &mut issues);
    }

    issues
}

fn check_node_ids(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for node in &doc.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(
                ValidationIssue::new(
                    IssueCode::DuplicateNodeId,
                    format!("node id '{}' appears more than once", node.id),
                )
                .on_node(&node.id),
            );
        }
    }
}

fn check_node_population(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let executable = doc.nodes.iter().filter(|n| !n.kind.is_virtual()).count();
    if executable == 0 {
        issues.push(ValidationIssue::new(
            IssueCode::NoExecutableNode,
            "workflow has no executable node",
        ));
    }

    let triggers: Vec<_> = doc
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Trigger)
        .collect();
    if triggers.len() > 1 {
        issues.push(ValidationIssue::new(
            IssueCode::MultipleTriggers,
            format!("workflow has {} trigger nodes", triggers.len()),
        ));
    }
}

fn check_edges(doc: &WorkflowDocument, registry: &Registry, issues: &mut Vec<ValidationIssue>) {
    let by_id: HashMap<&str, &NodeRecord> = doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for edge in &doc.edges {
        let source = by_id.get(edge.source.as_str()).copied();
        let target = by_id.get(edge.target.as_str()).copied();

        if source.is_none() {
            issues.push(
                ValidationIssue::new(
                    IssueCode::UnknownNode,
                    format!("edge references unknown source '{}'", edge.source),
                )
                .on_edge(&edge.id),
            );
        }
        if target.is_none() {
            issues.push(
                ValidationIssue::new(
                    IssueCode::UnknownNode,
                    format!("edge references unknown target '{}'", edge.target),
                )
                .on_edge(&edge.id),
            );
        }
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };

        if target.kind == NodeKind::Trigger {
            issues.push(
                ValidationIssue::new(
                    IssueCode::TriggerHasIncomingEdge,
                    format!("edge '{}' targets the trigger node", edge.id),
                )
                .on_edge(&edge.id),
            );
        }
        if source.kind == NodeKind::End {
            issues.push(
                ValidationIssue::new(
                    IssueCode::EndHasOutgoingEdge,
                    format!("end node '{}' has an outgoing edge", source.id),
                )
                .on_node(&source.id),
            );
        }

        if let (Some(sp), Some(tp)) = (&edge.source_port, &edge.target_port) {
            check_port_pair(registry, edge, source, sp, target, tp, issues);
        }
    }
}

fn check_port_pair(
    registry: &Registry,
    edge: &EdgeRecord,
    source: &NodeRecord,
    source_port: &str,
    target: &NodeRecord,
    target_port: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let out_type = output_type(registry, source, source_port);
    let in_type = input_type(registry, target, target_port);

    match (out_type, in_type) {
        (None, _) => issues.push(
            ValidationIssue::new(
                IssueCode::UnknownPort,
                format!("node '{}' has no output port '{}'", source.id, source_port),
            )
            .on_edge(&edge.id),
        ),
        (_, None) => issues.push(
            ValidationIssue::new(
                IssueCode::UnknownPort,
                format!("node '{}' has no input port '{}'", target.id, target_port),
            )
            .on_edge(&edge.id),
        ),
        (Some(out), Some(inp)) => {
            if !out.compatible(inp) {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::IncompatiblePorts,
                        format!(
                            "cannot wire {}:{} ({out:?}) into {}:{} ({inp:?})",
                            source.id, source_port, target.id, target_port
                        ),
                    )
                    .on_edge(&edge.id),
                );
            }
        }
    }
}

/// Output type of a port, honoring the trigger's dynamic outputs: declared
/// trigger outputs carry their configured type, undeclared ones are `any`.
fn output_type(registry: &Registry, node: &NodeRecord, port: &str) -> Option<PortType> {
    let ports = registry.ports_of(node.kind)?;
    if ports.dynamic_outputs {
        let declared = node.declared_outputs();
        return Some(
            declared
                .iter()
                .find(|(id, _)| id == port)
                .map(|(_, ty)| parse_port_type(ty))
                .unwrap_or(PortType::Any),
        );
    }
    ports.output(port).map(|p| p.port_type)
}

fn input_type(registry: &Registry, node: &NodeRecord, port: &str) -> Option<PortType> {
    registry
        .ports_of(node.kind)?
        .input(port)
        .map(|p| p.port_type)
}

fn parse_port_type(s: &str) -> PortType {
    match s {
        "string" => PortType::String,
        "number" => PortType::Number,
        "boolean" => PortType::Boolean,
        "object" => PortType::Object,
        "array" => PortType::Array,
        _ => PortType::Any,
    }
}

/// Per-kind required configuration.
fn required_config(kind: NodeKind) -> &'static [&'static str] {
    match kind {
        NodeKind::Agent => &["prompt"],
        NodeKind::Command => &["command"],
        NodeKind::SlashCommand => &["command"],
        NodeKind::Eval => &["source"],
        NodeKind::Llm => &["model"],
        NodeKind::DynamicAgent => &["promptExpr"],
        NodeKind::DynamicCommand => &["commandExpr"],
        _ => &[],
    }
}

fn check_configs(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    for node in &doc.nodes {
        for key in required_config(node.kind) {
            let missing = match node.config.get(key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::MissingConfig,
                        format!("{} node '{}' is missing '{}'", node.kind, node.id, key),
                    )
                    .on_node(&node.id),
                );
            }
        }
    }
}

fn check_transitions(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let ids: HashSet<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();

    for node in &doc.nodes {
        let Some(block) = node.transition() else {
            continue;
        };
        match crate::compile::parse_transition(block) {
            Ok(spec) => {
                for target in transition_targets(&spec) {
                    if target != crate::plan::END && !ids.contains(target.as_str()) {
                        issues.push(
                            ValidationIssue::new(
                                IssueCode::UnknownNode,
                                format!(
                                    "transition on '{}' targets unknown node '{}'",
                                    node.id, target
                                ),
                            )
                            .on_node(&node.id),
                        );
                    }
                }
                // Conditional and switch expressions must parse now; function
                // sources are allowed to fail (they downgrade to END).
                if let Some(expr) = transition_expr(&spec) {
                    if let Err(e) = Expr::parse(expr) {
                        issues.push(
                            ValidationIssue::new(
                                IssueCode::InvalidTransition,
                                format!("transition expression on '{}': {}", node.id, e),
                            )
                            .on_node(&node.id),
                        );
                    }
                }
            }
            Err(message) => issues.push(
                ValidationIssue::new(IssueCode::InvalidTransition, message).on_node(&node.id),
            ),
        }
    }
}

fn transition_targets(spec: &crate::plan::TransitionSpec) -> Vec<String> {
    use crate::plan::TransitionSpec::*;
    match spec {
        Simple { target } => vec![target.clone()],
        Conditional {
            then_target,
            else_target,
            ..
        } => vec![then_target.clone(), else_target.clone()],
        Switch { cases, default, .. } => {
            let mut targets: Vec<String> = cases.iter().map(|c| c.target.clone()).collect();
            targets.push(default.clone());
            targets
        }
        Function { .. } => vec![],
    }
}

fn transition_expr(spec: &crate::plan::TransitionSpec) -> Option<&str> {
    use crate::plan::TransitionSpec::*;
    match spec {
        Conditional { expr, .. } | Switch { expr, .. } => Some(expr),
        _ => None,
    }
}

/// Directed adjacency over edges plus declared transition targets.
fn adjacency(doc: &WorkflowDocument) -> HashMap<String, Vec<String>> {
    let ids: HashSet<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut adj: HashMap<String, Vec<String>> = HashMap::new();
    for node in &doc.nodes {
        adj.entry(node.id.clone()).or_default();
    }
    for edge in &doc.edges {
        adj.entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
    }
    for node in &doc.nodes {
        if let Some(Ok(spec)) = node.transition().map(crate::compile::parse_transition) {
            for target in transition_targets(&spec) {
                if ids.contains(target.as_str()) {
                    let entry = adj.entry(node.id.clone()).or_default();
                    if !entry.contains(&target) {
                        entry.push(target);
                    }
                }
            }
        }
    }
    adj
}

fn check_reachability(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let Some(trigger) = doc.trigger() else {
        return;
    };
    let adj = adjacency(doc);
    let mut seen = HashSet::new();
    let mut stack = vec![trigger.id.clone()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = adj.get(&id) {
            stack.extend(next.iter().cloned());
        }
    }
    for node in &doc.nodes {
        if !seen.contains(&node.id) {
            issues.push(
                ValidationIssue::new(
                    IssueCode::UnreachableNode,
                    format!("node '{}' is not reachable from the trigger", node.id),
                )
                .on_node(&node.id),
            );
        }
    }
}

/// Tarjan strongly-connected components, then terminal reachability over the
/// condensation. A node terminates if it is an end node, has no outgoing
/// edges, or reaches such a node; components that cannot are dead cycles.
fn check_dead_cycles(doc: &WorkflowDocument, issues: &mut Vec<ValidationIssue>) {
    let adj = adjacency(doc);
    let nodes: Vec<&str> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
    let index_of: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let ends: HashSet<&str> = doc
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::End)
        .map(|n| n.id.as_str())
        .collect();

    let sccs = tarjan(&nodes, &index_of, &adj);

    // Component id per node.
    let mut comp_of = vec![0usize; nodes.len()];
    for (c, scc) in sccs.iter().enumerate() {
        for &n in scc {
            comp_of[n] = c;
        }
    }

    // A component is locally terminal if it holds an end node or a node with
    // no outgoing edges.
    let mut terminal = vec![false; sccs.len()];
    for (c, scc) in sccs.iter().enumerate() {
        for &n in scc {
            let id = nodes[n];
            let out_degree = adj.get(id).map(Vec::len).unwrap_or(0);
            if ends.contains(id) || out_degree == 0 {
                terminal[c] = true;
            }
        }
    }

    // Condensation edges, then propagate terminal reachability backwards.
    // Tarjan emits components in reverse topological order, so a single
    // forward pass over successors suffices.
    let mut comp_edges: Vec<HashSet<usize>> = vec![HashSet::new(); sccs.len()];
    for (i, id) in nodes.iter().enumerate() {
        if let Some(next) = adj.get(*id) {
            for t in next {
                if let Some(&j) = index_of.get(t.as_str()) {
                    if comp_of[i] != comp_of[j] {
                        comp_edges[comp_of[i]].insert(comp_of[j]);
                    }
                }
            }
        }
    }
    for c in 0..sccs.len() {
        if comp_edges[c].iter().any(|&succ| terminal[succ]) {
            terminal[c] = true;
        }
    }

    for (c, scc) in sccs.iter().enumerate() {
        if terminal[c] {
            continue;
        }
        let members: Vec<&str> = scc.iter().map(|&n| nodes[n]).collect();
        issues.push(
            ValidationIssue::new(
                IssueCode::DeadCycle,
                format!("cycle [{}] has no path to an end node", members.join(", ")),
            )
            .on_node(members[0]),
        );
    }
}

/// Iterative Tarjan SCC. Components come out in reverse topological order.
fn tarjan(
    nodes: &[&str],
    index_of: &HashMap<&str, usize>,
    adj: &HashMap<String, Vec<String>>,
) -> Vec<Vec<usize>> {
    #[derive(Clone)]
    struct Frame {
        node: usize,
        next_child: usize,
    }

    let n = nodes.len();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![usize::MAX; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0usize;
    let mut sccs: Vec<Vec<usize>> = Vec::new();

    let children = |v: usize| -> Vec<usize> {
        adj.get(nodes[v])
            .map(|targets| {
                targets
                    .iter()
                    .filter_map(|t| index_of.get(t.as_str()).copied())
                    .collect()
            })
            .unwrap_or_default()
    };

    for start in 0..n {
        if index[start] != usize::MAX {
            continue;
        }
        let mut frames = vec![Frame {
            node: start,
            next_child: 0,
        }];
        index[start] = counter;
        lowlink[start] = counter;
        counter += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(frame) = frames.last_mut() {
            let v = frame.node;
            let kids = children(v);
            if frame.next_child < kids.len() {
                let w = kids[frame.next_child];
                frame.next_child += 1;
                if index[w] == usize::MAX {
                    index[w] = counter;
                    lowlink[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push(Frame {
                        node: w,
                        next_child: 0,
                    });
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                frames.pop();
                if let Some(parent) = frames.last() {
                    lowlink[parent.node] = lowlink[parent.node].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut scc = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }
    sccs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(nodes: serde_json::Value, edges: serde_json::Value) -> WorkflowDocument {
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

    fn codes(issues: &[ValidationIssue]) -> Vec<IssueCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_empty_graph() {
        let d = doc(json!([]), json!([]));
        assert_eq!(codes(&validate(&d, &Registry::new())), vec![IssueCode::EmptyGraph]);
    }

    #[test]
    fn test_valid_linear_graph() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger", "config": {"outputs": [{"id": "prompt", "type": "string"}]}},
                {"id": "l", "kind": "llm", "config": {"model": "gpt-4o", "userPrompt": "${prompt}"}},
                {"id": "e", "kind": "end", "config": {"targetStatus": "Done"}}
            ]),
            json!([
                {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "l", "targetPort": "prompt"},
                {"id": "e2", "source": "l", "target": "e"}
            ]),
        );
        assert!(validate(&d, &Registry::new()).is_empty());
    }

    #[test]
    fn test_multiple_triggers_and_trigger_incoming() {
        let d = doc(
            json!([
                {"id": "t1", "kind": "trigger"},
                {"id": "t2", "kind": "trigger"},
                {"id": "c", "kind": "command", "config": {"command": "true"}}
            ]),
            json!([
                {"id": "e1", "source": "c", "target": "t1"}
            ]),
        );
        let issues = validate(&d, &Registry::new());
        assert!(codes(&issues).contains(&IssueCode::MultipleTriggers));
        assert!(codes(&issues).contains(&IssueCode::TriggerHasIncomingEdge));
    }

    #[test]
    fn test_end_with_outgoing_edge() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "c", "kind": "command", "config": {"command": "true"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "c"},
                {"id": "e2", "source": "c", "target": "e"},
                {"id": "e3", "source": "e", "target": "c"}
            ]),
        );
        assert!(codes(&validate(&d, &Registry::new())).contains(&IssueCode::EndHasOutgoingEdge));
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "c", "kind": "command", "config": {"command": "true"}}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "c"},
                {"id": "e2", "source": "c", "target": "ghost"}
            ]),
        );
        assert!(codes(&validate(&d, &Registry::new())).contains(&IssueCode::UnknownNode));
    }

    #[test]
    fn test_incompatible_ports() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "c", "kind": "command", "config": {"command": "true"}},
                {"id": "l", "kind": "llm", "config": {"model": "gpt-4o"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "c"},
                {"id": "e2", "source": "c", "sourcePort": "exitCode", "target": "l", "targetPort": "prompt"},
                {"id": "e3", "source": "l", "target": "e"}
            ]),
        );
        assert!(codes(&validate(&d, &Registry::new())).contains(&IssueCode::IncompatiblePorts));
    }

    #[test]
    fn test_trigger_dynamic_output_port_is_any_when_undeclared() {
        // S3 shape: trigger declares no outputs but the edge names one;
        // compile-time validation must pass, the failure is at runtime.
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger", "config": {"outputs": []}},
                {"id": "l", "kind": "llm", "config": {"model": "gpt-4o"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "l", "targetPort": "prompt"},
                {"id": "e2", "source": "l", "target": "e"}
            ]),
        );
        assert!(validate(&d, &Registry::new()).is_empty());
    }

    #[test]
    fn test_missing_config() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "agent", "config": {}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "e"}
            ]),
        );
        let issues = validate(&d, &Registry::new());
        assert!(codes(&issues).contains(&IssueCode::MissingConfig));
    }

    #[test]
    fn test_unreachable_node() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {"command": "true"}},
                {"id": "b", "kind": "command", "config": {"command": "true"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "e"},
                {"id": "e3", "source": "b", "target": "e"}
            ]),
        );
        let issues = validate(&d, &Registry::new());
        assert_eq!(codes(&issues), vec![IssueCode::UnreachableNode]);
        assert_eq!(issues[0].node_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_dead_cycle_detected() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {"command": "true"}},
                {"id": "b", "kind": "command", "config": {"command": "true"}}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "b"},
                {"id": "e3", "source": "b", "target": "a"}
            ]),
        );
        assert!(codes(&validate(&d, &Registry::new())).contains(&IssueCode::DeadCycle));
    }

    #[test]
    fn test_cycle_with_exit_is_allowed() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {"command": "true", "transition": {"type": "conditional", "expr": "context.retry", "then": "b", "else": "e"}}},
                {"id": "b", "kind": "command", "config": {"command": "true"}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "b"},
                {"id": "e3", "source": "b", "target": "a"},
                {"id": "e4", "source": "a", "target": "e"}
            ]),
        );
        let issues = validate(&d, &Registry::new());
        assert!(!codes(&issues).contains(&IssueCode::DeadCycle), "{issues:?}");
    }

    #[test]
    fn test_invalid_transition_block() {
        let d = doc(
            json!([
                {"id": "t", "kind": "trigger"},
                {"id": "a", "kind": "command", "config": {"command": "true", "transition": {"type": "warp"}}},
                {"id": "e", "kind": "end"}
            ]),
            json!([
                {"id": "e1", "source": "t", "target": "a"},
                {"id": "e2", "source": "a", "target": "e"}
            ]),
        );
        assert!(codes(&validate(&d, &Registry::new())).contains(&IssueCode::InvalidTransition));
    }
}
