//! Execution dispatcher
//!
//! Given a compiled plan, runs it in-process or on an ephemeral container.
//! The remote path materialises the plan, signs a scoped execution token,
//! creates the service with the token/plan-ref/endpoint variables, polls the
//! deployment with exponential backoff, and reconciles the container's
//! webhooks back into interpreter state. The service is deleted and the
//! token loses its power once the execution reaches a terminal status.

use crate::db::repositories::PlanRepository;
use crate::db::DatabasePool;
use crate::platform::{ContainerPlatform, DeploymentStatus, ServiceSpec};
use crate::token::TokenSigner;
use foundry_engine::{EngineError, Interpreter, Result};
use foundry_graph::Plan;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Where an execution runs. Selection is a per-workflow flag; local is the
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Remote,
}

/// Deployment polling and callback configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_initial: Duration,
    pub poll_max: Duration,
    pub deploy_deadline: Duration,
    pub endpoint_url: String,
    pub default_image: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_initial: Duration::from_secs(5),
            poll_max: Duration::from_secs(30),
            deploy_deadline: Duration::from_secs(300),
            endpoint_url: "http://127.0.0.1:8080".to_string(),
            default_image: "foundry-runner:latest".to_string(),
        }
    }
}

/// Webhook payload posted by remote containers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WebhookPayload {
    #[serde(rename_all = "camelCase")]
    Activity {
        node_id: String,
        name: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    PortData {
        node_id: String,
        ports: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        #[serde(default)]
        target_status: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error { kind: String, message: String },
}

pub struct Dispatcher {
    interpreter: Arc<Interpreter>,
    platform: Arc<dyn ContainerPlatform>,
    signer: Arc<TokenSigner>,
    pool: Arc<DatabasePool>,
    config: DispatcherConfig,
    /// execution id → platform service id, for teardown.
    services: Arc<Mutex<HashMap<String, String>>>,
}

impl Dispatcher {
    pub fn new(
        interpreter: Arc<Interpreter>,
        platform: Arc<dyn ContainerPlatform>,
        signer: Arc<TokenSigner>,
        pool: Arc<DatabasePool>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            interpreter,
            platform,
            signer,
            pool,
            config,
            services: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interpreter(&self) -> Arc<Interpreter> {
        self.interpreter.clone()
    }

    /// Start an execution and drive it to completion in the chosen mode.
    /// Returns the execution id immediately; progress flows through the
    /// event bus and the persisted state.
    pub async fn execute(
        &self,
        plan: Arc<Plan>,
        initial_context: Map<String, Value>,
        env: HashMap<String, String>,
        mode: ExecutionMode,
    ) -> Result<String> {
        match mode {
            ExecutionMode::Local => self.execute_local(plan, initial_context, env).await,
            ExecutionMode::Remote => self.execute_remote(plan, initial_context, env).await,
        }
    }

    async fn execute_local(
        &self,
        plan: Arc<Plan>,
        initial_context: Map<String, Value>,
        env: HashMap<String, String>,
    ) -> Result<String> {
        let execution_id = self.interpreter.start(plan, initial_context, env).await?;
        let interpreter = self.interpreter.clone();
        let id = execution_id.clone();
        tokio::spawn(async move {
            if let Err(e) = interpreter.run(&id).await {
                tracing::error!(execution = %id, error = %e, "local run aborted");
            }
        });
        Ok(execution_id)
    }

    async fn execute_remote(
        &self,
        plan: Arc<Plan>,
        initial_context: Map<String, Value>,
        env: HashMap<String, String>,
    ) -> Result<String> {
        let execution_id = self
            .interpreter
            .start(plan.clone(), initial_context, env.clone())
            .await?;

        PlanRepository::upsert(&self.pool, &execution_id, &plan)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let token = self
            .signer
            .sign(&execution_id, &plan.workflow_id)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let mut variables = env;
        variables.insert("FOUNDRY_TOKEN".to_string(), token);
        variables.insert("FOUNDRY_PLAN_REF".to_string(), execution_id.clone());
        variables.insert(
            "FOUNDRY_ENDPOINT_URL".to_string(),
            format!(
                "{}/exec/{}/event",
                self.config.endpoint_url.trim_end_matches('/'),
                execution_id
            ),
        );

        let spec = ServiceSpec {
            name: format!("exec-{execution_id}"),
            image: plan
                .docker_image
                .clone()
                .unwrap_or_else(|| self.config.default_image.clone()),
            variables,
        };

        let service_id = match self.platform.create_service(&spec).await {
            Ok(id) => id,
            Err(message) => {
                self.interpreter
                    .apply_remote_error(&execution_id, "PlatformError", &message)
                    .await?;
                return Err(EngineError::Platform(message));
            }
        };
        tracing::info!(execution = %execution_id, service = %service_id, "remote service created");
        self.services
            .lock()
            .insert(execution_id.clone(), service_id.clone());

        tokio::spawn(poll_deployment(
            self.interpreter.clone(),
            self.platform.clone(),
            self.services.clone(),
            self.config.clone(),
            execution_id.clone(),
            service_id,
        ));

        Ok(execution_id)
    }

    /// Verify and apply one container webhook.
    ///
    /// Any verification failure — signature, issuer, audience, expiry, a
    /// token scoped to another execution, or an execution already terminal —
    /// is an `UnauthorizedWebhook`: dropped without state change, never
    /// retried.
    pub async fn handle_webhook(
        &self,
        execution_id: &str,
        bearer_token: &str,
        payload: WebhookPayload,
    ) -> Result<()> {
        self.signer
            .verify_for_execution(bearer_token, execution_id)
            .map_err(|e| EngineError::UnauthorizedWebhook(e.to_string()))?;

        let state = self
            .interpreter
            .get_state(execution_id)
            .await?
            .ok_or_else(|| {
                EngineError::UnauthorizedWebhook(format!("unknown execution '{execution_id}'"))
            })?;
        if state.status.is_terminal() {
            return Err(EngineError::UnauthorizedWebhook(
                "execution already terminal; token invalidated".to_string(),
            ));
        }

        match payload {
            WebhookPayload::Activity {
                node_id,
                name,
                data,
            } => {
                self.interpreter
                    .apply_remote_activity(execution_id, &node_id, &name, data)
                    .await
            }
            WebhookPayload::PortData { node_id, ports } => {
                self.interpreter
                    .apply_remote_port_data(execution_id, &node_id, ports)
                    .await
            }
            WebhookPayload::Complete { target_status } => {
                self.interpreter
                    .apply_remote_complete(execution_id, target_status)
                    .await?;
                self.teardown(execution_id).await;
                Ok(())
            }
            WebhookPayload::Error { kind, message } => {
                self.interpreter
                    .apply_remote_error(execution_id, &kind, &message)
                    .await?;
                self.teardown(execution_id).await;
                Ok(())
            }
        }
    }

    /// Cancel an execution; remote runs additionally lose their container.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.interpreter.cancel(execution_id).await?;
        self.teardown(execution_id).await;
        Ok(())
    }

    /// Whether a service is still tracked for this execution.
    pub fn has_service(&self, execution_id: &str) -> bool {
        self.services.lock().contains_key(execution_id)
    }

    async fn teardown(&self, execution_id: &str) {
        let service = self.services.lock().remove(execution_id);
        if let Some(service_id) = service {
            if let Err(e) = self.platform.delete_service(&service_id).await {
                tracing::warn!(execution = %execution_id, service = %service_id, error = %e,
                    "container delete failed");
            }
        }
    }
}

/// Poll the platform until the deployment is terminal or the deadline
/// elapses. Backoff doubles from `poll_initial` up to `poll_max`.
async fn poll_deployment(
    interpreter: Arc<Interpreter>,
    platform: Arc<dyn ContainerPlatform>,
    services: Arc<Mutex<HashMap<String, String>>>,
    config: DispatcherConfig,
    execution_id: String,
    service_id: String,
) {
    let deadline = Instant::now() + config.deploy_deadline;
    let mut delay = config.poll_initial;

    let failure = loop {
        match platform.deployment_status(&service_id).await {
            Ok(DeploymentStatus::Success) => {
                tracing::info!(execution = %execution_id, "deployment ready");
                return;
            }
            Ok(status @ (DeploymentStatus::Failed | DeploymentStatus::Crashed)) => {
                break ("PlatformError", format!("deployment ended in {status:?}"));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(execution = %execution_id, error = %e, "deployment poll failed");
            }
        }

        if Instant::now() + delay > deadline {
            break (
                "DeploymentTimeout",
                "deployment did not become ready before the deadline".to_string(),
            );
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(config.poll_max);
    };

    let (kind, message) = failure;
    // terminal status also invalidates the execution token
    if let Err(e) = interpreter
        .apply_remote_error(&execution_id, kind, &message)
        .await
    {
        tracing::error!(execution = %execution_id, error = %e, "failed to record deployment failure");
    }
    let service = services.lock().remove(&execution_id);
    if let Some(service_id) = service {
        if let Err(e) = platform.delete_service(&service_id).await {
            tracing::warn!(execution = %execution_id, error = %e, "container delete failed");
        }
    }
}
