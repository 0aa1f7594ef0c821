//! Port/type registry for the closed set of node kinds
//!
//! The registry is a static table: for every [`NodeKind`] it answers which
//! input and output ports the kind declares, and whether two ports may be
//! wired together. There is no dynamic registration — the kind set is closed.
//!
//! # Compatibility rule
//!
//! Two ports connect iff their types are equal, or either side is
//! [`PortType::Any`]:
//!
//! ```rust
//! use foundry_graph::registry::{PortType, Registry, NodeKind};
//!
//! assert!(PortType::String.compatible(PortType::String));
//! assert!(PortType::Any.compatible(PortType::Number));
//! assert!(!PortType::String.compatible(PortType::Number));
//!
//! let registry = Registry::new();
//! let llm = registry.ports_of(NodeKind::Llm).unwrap();
//! assert!(llm.input("prompt").unwrap().required);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The closed set of node kinds a workflow document may contain.
///
/// `Trigger` and `End` are *virtual*: they never execute. The trigger only
/// seeds port data at compile time and the end node only contributes its
/// `targetStatus` to the plan's end mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Trigger,
    Agent,
    Command,
    SlashCommand,
    Eval,
    Llm,
    Http,
    DynamicAgent,
    DynamicCommand,
    GitCheckout,
    GithubProject,
    End,
}

impl NodeKind {
    /// True for the virtual kinds that never execute.
    pub fn is_virtual(&self) -> bool {
        matches!(self, NodeKind::Trigger | NodeKind::End)
    }

    /// All kinds, in declaration order.
    pub fn all() -> &'static [NodeKind] {
        &[
            NodeKind::Trigger,
            NodeKind::Agent,
            NodeKind::Command,
            NodeKind::SlashCommand,
            NodeKind::Eval,
            NodeKind::Llm,
            NodeKind::Http,
            NodeKind::DynamicAgent,
            NodeKind::DynamicCommand,
            NodeKind::GitCheckout,
            NodeKind::GithubProject,
            NodeKind::End,
        ]
    }

    /// The wire name (kebab-case), matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Agent => "agent",
            NodeKind::Command => "command",
            NodeKind::SlashCommand => "slash-command",
            NodeKind::Eval => "eval",
            NodeKind::Llm => "llm",
            NodeKind::Http => "http",
            NodeKind::DynamicAgent => "dynamic-agent",
            NodeKind::DynamicCommand => "dynamic-command",
            NodeKind::GitCheckout => "git-checkout",
            NodeKind::GithubProject => "github-project",
            NodeKind::End => "end",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl PortType {
    /// Equality-or-any compatibility.
    pub fn compatible(self, other: PortType) -> bool {
        self == other || self == PortType::Any || other == PortType::Any
    }
}

/// A single declared input or output slot on a node kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port identifier, unique within the node side.
    pub id: &'static str,
    /// Declared data type.
    pub port_type: PortType,
    /// Whether the interpreter must resolve a value before executing.
    pub required: bool,
}

impl PortSpec {
    const fn new(id: &'static str, port_type: PortType, required: bool) -> Self {
        Self {
            id,
            port_type,
            required,
        }
    }
}

/// The declared input and output ports of one node kind.
#[derive(Debug, Clone)]
pub struct PortSet {
    pub inputs: &'static [PortSpec],
    pub outputs: &'static [PortSpec],
    /// Trigger outputs are declared per-node in its config, not here.
    pub dynamic_outputs: bool,
}

impl PortSet {
    pub fn input(&self, id: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output(&self, id: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

const NO_PORTS: &[PortSpec] = &[];

const AGENT_INPUTS: &[PortSpec] = &[PortSpec::new("prompt", PortType::String, false)];
const AGENT_OUTPUTS: &[PortSpec] = &[PortSpec::new("response", PortType::Object, false)];

const COMMAND_INPUTS: &[PortSpec] = &[PortSpec::new("input", PortType::String, false)];
const COMMAND_OUTPUTS: &[PortSpec] = &[
    PortSpec::new("stdout", PortType::String, false),
    PortSpec::new("stderr", PortType::String, false),
    PortSpec::new("exitCode", PortType::Number, false),
];

const EVAL_INPUTS: &[PortSpec] = &[PortSpec::new("value", PortType::Any, false)];
const EVAL_OUTPUTS: &[PortSpec] = &[PortSpec::new("result", PortType::Object, false)];

const LLM_INPUTS: &[PortSpec] = &[
    PortSpec::new("prompt", PortType::String, true),
    PortSpec::new("system", PortType::String, false),
];
const LLM_OUTPUTS: &[PortSpec] = &[
    PortSpec::new("text", PortType::String, false),
    PortSpec::new("json", PortType::Object, false),
    PortSpec::new("usage", PortType::Object, false),
];

const HTTP_INPUTS: &[PortSpec] = &[
    PortSpec::new("url", PortType::String, false),
    PortSpec::new("body", PortType::Any, false),
];
const HTTP_OUTPUTS: &[PortSpec] = &[
    PortSpec::new("status", PortType::Number, false),
    PortSpec::new("headers", PortType::Object, false),
    PortSpec::new("body", PortType::Any, false),
];

const GIT_INPUTS: &[PortSpec] = &[
    PortSpec::new("owner", PortType::String, false),
    PortSpec::new("repo", PortType::String, false),
    PortSpec::new("ref", PortType::String, false),
];
const GIT_OUTPUTS: &[PortSpec] = &[PortSpec::new("path", PortType::String, false)];

const PROJECT_INPUTS: &[PortSpec] = &[PortSpec::new("updates", PortType::Array, false)];
const PROJECT_OUTPUTS: &[PortSpec] = &[PortSpec::new("items", PortType::Array, false)];

const END_INPUTS: &[PortSpec] = &[PortSpec::new("result", PortType::Any, false)];

/// Static port registry keyed by node kind.
#[derive(Debug, Clone)]
pub struct Registry {
    table: HashMap<NodeKind, PortSet>,
}

impl Registry {
    /// Build the registry table. The set is exhaustive and fixed.
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(
            NodeKind::Trigger,
            PortSet {
                inputs: NO_PORTS,
                outputs: NO_PORTS,
                dynamic_outputs: true,
            },
        );
        table.insert(
            NodeKind::Agent,
            PortSet {
                inputs: AGENT_INPUTS,
                outputs: AGENT_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::Command,
            PortSet {
                inputs: COMMAND_INPUTS,
                outputs: COMMAND_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::SlashCommand,
            PortSet {
                inputs: COMMAND_INPUTS,
                outputs: COMMAND_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::Eval,
            PortSet {
                inputs: EVAL_INPUTS,
                outputs: EVAL_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::Llm,
            PortSet {
                inputs: LLM_INPUTS,
                outputs: LLM_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::Http,
            PortSet {
                inputs: HTTP_INPUTS,
                outputs: HTTP_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::DynamicAgent,
            PortSet {
                inputs: AGENT_INPUTS,
                outputs: AGENT_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::DynamicCommand,
            PortSet {
                inputs: COMMAND_INPUTS,
                outputs: COMMAND_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::GitCheckout,
            PortSet {
                inputs: GIT_INPUTS,
                outputs: GIT_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::GithubProject,
            PortSet {
                inputs: PROJECT_INPUTS,
                outputs: PROJECT_OUTPUTS,
                dynamic_outputs: false,
            },
        );
        table.insert(
            NodeKind::End,
            PortSet {
                inputs: END_INPUTS,
                outputs: NO_PORTS,
                dynamic_outputs: false,
            },
        );
        Self { table }
    }

    /// Look up the ports of a node kind.
    ///
    /// Returns `None` only if the kind is missing from the table, which is a
    /// programmer error surfaced as a validation failure by the compiler.
    pub fn ports_of(&self, kind: NodeKind) -> Option<&PortSet> {
        self.table.get(&kind)
    }

    /// Whether `port_a` (an output of `kind_a`) may be wired into `port_b`
    /// (an input of `kind_b`). Unknown ports are not compatible.
    pub fn compatible(&self, kind_a: NodeKind, port_a: &str, kind_b: NodeKind, port_b: &str) -> bool {
        let Some(out) = self.ports_of(kind_a).and_then(|p| p.output(port_a)) else {
            return false;
        };
        let Some(inp) = self.ports_of(kind_b).and_then(|p| p.input(port_b)) else {
            return false;
        };
        out.port_type.compatible(inp.port_type)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
