//! Graph layer of the Foundry workflow engine
//!
//! This crate owns everything that happens *before* execution:
//!
//! - the static [`registry`] of node kinds and their typed ports,
//! - the persisted [`document`] model (nodes, edges, initial context),
//! - [`validate`](validate::validate), which reports structural issues,
//! - [`compile`](compile::compile), which turns a valid document into an
//!   immutable, serializable [`Plan`](plan::Plan),
//! - the restricted [`expr`] language used by transitions, eval nodes and
//!   `${...}` templates.
//!
//! The compiler is pure: no I/O, no clocks, and byte-equal inputs produce
//! equal plans.
//!
//! # Example
//!
//! ```rust
//! use foundry_graph::{compile::compile, registry::Registry};
//! use serde_json::json;
//!
//! let doc = serde_json::from_value(json!({
//!     "id": "wf", "projectId": "proj", "name": "demo",
//!     "nodes": [
//!         {"id": "t", "kind": "trigger", "config": {"outputs": [{"id": "prompt", "type": "string"}]}},
//!         {"id": "l", "kind": "llm", "config": {"model": "gpt-4o"}},
//!         {"id": "e", "kind": "end", "config": {"targetStatus": "Done"}}
//!     ],
//!     "edges": [
//!         {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "l", "targetPort": "prompt"},
//!         {"id": "e2", "source": "l", "target": "e"}
//!     ],
//!     "initialContext": {"prompt": "hi"},
//!     "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z"
//! })).unwrap();
//!
//! let plan = compile(&doc, &serde_json::Map::from_iter([
//!     ("prompt".to_string(), json!("hi"))
//! ]), &Registry::new()).unwrap();
//! assert_eq!(plan.entry.as_deref(), Some("l"));
//! ```

pub mod compile;
pub mod document;
pub mod error;
pub mod expr;
pub mod issue;
pub mod plan;
pub mod registry;
pub mod validate;

pub use compile::{compile, parse_transition};
pub use document::{EdgeRecord, NodeRecord, Position, WorkflowDocument};
pub use error::{GraphError, Result};
pub use expr::{render_template, truthy, Expr};
pub use issue::{IssueCode, ValidationIssue};
pub use plan::{Plan, PlanNode, PortRef, SwitchCase, TransitionSpec, END};
pub use registry::{NodeKind, PortSpec, PortType, Registry};
pub use validate::validate;
