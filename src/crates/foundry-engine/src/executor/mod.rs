//! Node executor contract and registry
//!
//! One executor per node kind. Each receives the node config, the inputs the
//! interpreter resolved from port data, and an expression scope; it returns
//! outputs, context updates and a next-selector. Executors never touch other
//! nodes' port data — all cross-node flow is resolved by the interpreter.

pub mod agent;
pub mod command;
pub mod dynamic;
pub mod eval;
pub mod git_checkout;
pub mod github_project;
pub mod http;
pub mod llm;
pub mod slash_command;

use crate::error::Result;
use crate::event::{EventBus, EventKind};
use crate::traits::{AgentProvider, ProjectTracker, SlashCommands};
use async_trait::async_trait;
use foundry_graph::{NodeKind, PlanNode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// What the interpreter hands an executor for one step.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub execution_id: String,
    pub node: PlanNode,
    /// Inputs resolved from port data via the plan's port mappings.
    pub inputs: Map<String, Value>,
    /// Expression/template scope: the execution context and resolved inputs
    /// at the top level, plus `context`, `answers`, `currentNode`, `status`.
    pub scope: Value,
    /// Decrypted workflow environment.
    pub env: HashMap<String, String>,
}

impl ExecRequest {
    /// String field from the node config.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.node.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.node.config.get(key).and_then(Value::as_u64)
    }

    pub fn config_bool(&self, key: &str) -> bool {
        self.node
            .config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Resolved input port value.
    pub fn input(&self, port: &str) -> Option<&Value> {
        self.inputs.get(port)
    }

    /// String value of an input port.
    pub fn input_str(&self, port: &str) -> Option<&str> {
        self.inputs.get(port).and_then(Value::as_str)
    }
}

/// Where an execution goes after this step.
#[derive(Debug, Clone, PartialEq)]
pub enum NextSelector {
    /// Follow the node's compiled transition.
    Follow,
    /// Suspend in `waiting_user` until the question is answered or skipped.
    Suspend { question_id: String, prompt: Value },
}

/// The result tuple of one executor invocation.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub outputs: Map<String, Value>,
    pub context_updates: Map<String, Value>,
    pub next: NextSelector,
    /// Tokens consumed, for LLM-backed executors.
    pub token_count: Option<i64>,
}

impl ExecOutcome {
    pub fn new() -> Self {
        Self {
            outputs: Map::new(),
            context_updates: Map::new(),
            next: NextSelector::Follow,
            token_count: None,
        }
    }

    pub fn with_output(mut self, port: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(port.into(), value);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context_updates.insert(key.into(), value);
        self
    }
}

impl Default for ExecOutcome {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle executors use to stream `activity:*` events for their node.
#[derive(Clone)]
pub struct ActivitySink {
    bus: Arc<EventBus>,
    execution_id: String,
    node_id: String,
}

impl ActivitySink {
    pub fn new(bus: Arc<EventBus>, execution_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            bus,
            execution_id: execution_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn emit(&self, name: &str, data: Value) {
        self.bus.emit(
            &self.execution_id,
            EventKind::Activity {
                node_id: self.node_id.clone(),
                name: name.to_string(),
                data,
            },
        );
    }
}

/// One executor per node kind.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn kind(&self) -> NodeKind;

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome>;
}

/// Kind-indexed executor table.
#[derive(Default)]
pub struct ExecutorSet {
    map: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.map.insert(executor.kind(), executor);
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeExecutor>> {
        self.map.get(&kind).cloned()
    }

    /// The full standard set, wired to the given external seams.
    pub fn standard(
        provider: Arc<dyn AgentProvider>,
        chat: Arc<dyn foundry_llm::ChatModel>,
        tracker: Arc<dyn ProjectTracker>,
        slash_commands: Arc<SlashCommands>,
    ) -> Self {
        let mut set = Self::new();
        let agent = Arc::new(agent::AgentExecutor::new(provider.clone()));
        let command = Arc::new(command::CommandExecutor::new());
        set.register(agent.clone());
        set.register(command.clone());
        set.register(Arc::new(slash_command::SlashCommandExecutor::new(
            slash_commands,
        )));
        set.register(Arc::new(eval::EvalExecutor::new()));
        set.register(Arc::new(llm::LlmExecutor::new(chat)));
        set.register(Arc::new(http::HttpExecutor::new()));
        set.register(Arc::new(dynamic::DynamicAgentExecutor::new(agent)));
        set.register(Arc::new(dynamic::DynamicCommandExecutor::new(command)));
        set.register(Arc::new(git_checkout::GitCheckoutExecutor::new()));
        set.register(Arc::new(github_project::GithubProjectExecutor::new(tracker)));
        set
    }
}
