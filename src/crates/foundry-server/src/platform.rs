//! Container-hosting platform seam
//!
//! The dispatcher creates one short-lived service per remote execution and
//! polls its deployment until it reaches a terminal state. The platform API
//! is wrapped behind [`ContainerPlatform`] so tests can stub it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deployment lifecycle as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Deploying,
    Success,
    Failed,
    Crashed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Crashed
        )
    }
}

/// What the dispatcher asks the platform to run.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// Injected container environment: token, plan ref, endpoint URL and the
    /// decrypted workflow environment.
    pub variables: HashMap<String, String>,
}

#[async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// Create a service; returns the platform's service id.
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, String>;

    /// Current deployment status of a service.
    async fn deployment_status(&self, service_id: &str) -> Result<DeploymentStatus, String>;

    /// Tear the service down.
    async fn delete_service(&self, service_id: &str) -> Result<(), String>;
}

/// REST client for the hosting platform.
pub struct HttpContainerPlatform {
    client: Client,
    base_url: String,
    api_token: String,
    project_id: String,
    environment_id: String,
}

impl HttpContainerPlatform {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            project_id: project_id.into(),
            environment_id: environment_id.into(),
        }
    }
}

#[derive(Deserialize)]
struct CreateServiceResponse {
    id: String,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    status: DeploymentStatus,
}

#[async_trait]
impl ContainerPlatform for HttpContainerPlatform {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, String> {
        let url = format!(
            "{}/v1/projects/{}/environments/{}/services",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.environment_id,
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(spec)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("service create returned {}", response.status()));
        }
        let body: CreateServiceResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.id)
    }

    async fn deployment_status(&self, service_id: &str) -> Result<DeploymentStatus, String> {
        let url = format!(
            "{}/v1/services/{}/deployment",
            self.base_url.trim_end_matches('/'),
            service_id,
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("deployment status returned {}", response.status()));
        }
        let body: DeploymentResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.status)
    }

    async fn delete_service(&self, service_id: &str) -> Result<(), String> {
        let url = format!(
            "{}/v1/services/{}",
            self.base_url.trim_end_matches('/'),
            service_id,
        );
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("service delete returned {}", response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(DeploymentStatus::Success.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(DeploymentStatus::Crashed.is_terminal());
        assert!(!DeploymentStatus::Building.is_terminal());
        assert!(!DeploymentStatus::Queued.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        let status: DeploymentStatus = serde_json::from_str("\"BUILDING\"").unwrap();
        assert_eq!(status, DeploymentStatus::Building);
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
    }
}
