//! External collaborator seams
//!
//! The engine talks to the outside world through these narrow traits: the
//! agent runtime, the project-tracking API and the internal slash-command
//! registry. Server wiring provides real implementations; tests use stubs.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Request passed to the external agent runtime.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: Option<String>,
    pub prompt: String,
    pub model: Option<String>,
    pub capabilities: Vec<String>,
    pub max_turns: Option<u32>,
    pub temperature: Option<f64>,
    pub mcp_servers: Vec<Value>,
}

/// Agent runtime reply.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub response: Value,
    pub token_count: Option<i64>,
}

/// The external LLM "agent" runtime behind the `agent` node kind.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentResponse, String>;
}

/// The external project-tracking API behind `github-project` nodes and
/// automation write-backs.
#[async_trait]
pub trait ProjectTracker: Send + Sync {
    /// Apply a batch of item updates; returns the reconciled item data.
    async fn apply_updates(&self, project_id: &str, updates: &[Value]) -> Result<Vec<Value>, String>;

    /// Move an issue to a status.
    async fn set_issue_status(
        &self,
        project_id: &str,
        issue_id: &str,
        status: &str,
    ) -> Result<(), String>;
}

/// Internal name → command-template registry for `slash-command` nodes.
#[derive(Default)]
pub struct SlashCommands {
    commands: RwLock<HashMap<String, String>>,
}

impl SlashCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named command. The template may reference `${args}`.
    pub fn register(&self, name: impl Into<String>, template: impl Into<String>) {
        self.commands.write().insert(name.into(), template.into());
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.commands.read().get(name).cloned()
    }
}
