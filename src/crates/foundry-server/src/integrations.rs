//! Production implementations of the engine's external seams
//!
//! The agent runtime is fronted by whatever chat provider is configured
//! (agents degrade to a single provider round-trip with the role as system
//! prompt), and the project tracker is a thin REST client.

use async_trait::async_trait;
use foundry_engine::{AgentProvider, AgentRequest, AgentResponse, ProjectTracker};
use foundry_llm::{ChatModel, ChatRequest};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

/// Agent runtime backed by a chat provider.
pub struct ChatAgentProvider {
    chat: Arc<dyn ChatModel>,
    default_model: String,
}

impl ChatAgentProvider {
    pub fn new(chat: Arc<dyn ChatModel>, default_model: impl Into<String>) -> Self {
        Self {
            chat,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl AgentProvider for ChatAgentProvider {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentResponse, String> {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model.clone());
        let mut chat_request = ChatRequest::new(model, request.prompt);
        chat_request.system_prompt = request.role;
        chat_request.temperature = request.temperature;

        let response = self
            .chat
            .chat(chat_request)
            .await
            .map_err(|e| e.to_string())?;

        Ok(AgentResponse {
            token_count: Some(response.usage.total()),
            response: json!({"text": response.text()}),
        })
    }
}

/// REST client for the external project-tracking service.
pub struct HttpProjectTracker {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpProjectTracker {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl ProjectTracker for HttpProjectTracker {
    async fn apply_updates(&self, project_id: &str, updates: &[Value]) -> Result<Vec<Value>, String> {
        let url = format!(
            "{}/projects/{}/items/batch",
            self.base_url.trim_end_matches('/'),
            project_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({"updates": updates}))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("batch update returned {}", response.status()));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_issue_status(
        &self,
        project_id: &str,
        issue_id: &str,
        status: &str,
    ) -> Result<(), String> {
        let url = format!(
            "{}/projects/{}/issues/{}/status",
            self.base_url.trim_end_matches('/'),
            project_id,
            issue_id
        );
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({"status": status}))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status update returned {}", response.status()));
        }
        Ok(())
    }
}

/// Tracker used when no external service is configured: logs and succeeds,
/// so local development does not require the tracking integration.
pub struct LoggingTracker;

#[async_trait]
impl ProjectTracker for LoggingTracker {
    async fn apply_updates(&self, project_id: &str, updates: &[Value]) -> Result<Vec<Value>, String> {
        tracing::info!(project = project_id, count = updates.len(), "tracker updates (no-op)");
        Ok(updates.to_vec())
    }

    async fn set_issue_status(
        &self,
        project_id: &str,
        issue_id: &str,
        status: &str,
    ) -> Result<(), String> {
        tracing::info!(project = project_id, issue = issue_id, status, "issue status (no-op)");
        Ok(())
    }
}
