//! Shared harness for server integration tests

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use foundry_engine::{
    AgentProvider, AgentRequest, AgentResponse, EventBus, ExecutorSet, Interpreter,
    ProjectTracker, SlashCommands,
};
use foundry_graph::Registry;
use foundry_llm::{ChatModel, ChatRequest, ChatResponse, Usage};
use foundry_server::api::AppState;
use foundry_server::automation::AutomationRouter;
use foundry_server::db::DatabaseConnection;
use foundry_server::dispatcher::{Dispatcher, DispatcherConfig};
use foundry_server::platform::{ContainerPlatform, DeploymentStatus, ServiceSpec};
use foundry_server::secrets::EnvCipher;
use foundry_server::store::SqliteStateSaver;
use foundry_server::token::TokenSigner;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TEST_SECRET: &str = "integration-test-signing-secret!";

pub struct StubChat;

#[async_trait]
impl ChatModel for StubChat {
    async fn chat(&self, _request: ChatRequest) -> foundry_llm::Result<ChatResponse> {
        Ok(ChatResponse {
            content: json!("hello"),
            usage: Usage {
                input_tokens: 1,
                output_tokens: 2,
            },
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub struct StubAgent;

#[async_trait]
impl AgentProvider for StubAgent {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentResponse, String> {
        Ok(AgentResponse {
            response: json!({"prompt": request.prompt}),
            token_count: Some(3),
        })
    }
}

/// Tracker that records every status write-back.
#[derive(Default)]
pub struct RecordingTracker {
    pub statuses: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ProjectTracker for RecordingTracker {
    async fn apply_updates(&self, _project_id: &str, updates: &[Value]) -> Result<Vec<Value>, String> {
        Ok(updates.to_vec())
    }

    async fn set_issue_status(
        &self,
        project_id: &str,
        issue_id: &str,
        status: &str,
    ) -> Result<(), String> {
        self.statuses.lock().push((
            project_id.to_string(),
            issue_id.to_string(),
            status.to_string(),
        ));
        Ok(())
    }
}

/// Platform stub with a scriptable deployment status.
pub struct StubPlatform {
    pub status: Mutex<DeploymentStatus>,
    pub created: Mutex<Vec<ServiceSpec>>,
    pub deleted: Mutex<Vec<String>>,
}

impl StubPlatform {
    pub fn stuck_building() -> Self {
        Self {
            status: Mutex::new(DeploymentStatus::Building),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContainerPlatform for StubPlatform {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, String> {
        self.created.lock().push(spec.clone());
        Ok(format!("svc-{}", self.created.lock().len()))
    }

    async fn deployment_status(&self, _service_id: &str) -> Result<DeploymentStatus, String> {
        Ok(*self.status.lock())
    }

    async fn delete_service(&self, service_id: &str) -> Result<(), String> {
        self.deleted.lock().push(service_id.to_string());
        Ok(())
    }
}

pub fn test_key() -> String {
    BASE64.encode([42u8; 32])
}

pub struct Harness {
    pub state: AppState,
    pub tracker: Arc<RecordingTracker>,
    pub platform: Arc<StubPlatform>,
}

/// Full application state over an in-memory database, stub providers, a
/// scriptable platform and fast deployment polling.
pub async fn harness(dispatcher_config: DispatcherConfig) -> Harness {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.init_schema().await.unwrap();

    let cipher = Arc::new(EnvCipher::from_base64_key(&test_key()).unwrap());
    let signer = Arc::new(TokenSigner::new(TEST_SECRET));
    let tracker = Arc::new(RecordingTracker::default());
    let platform = Arc::new(StubPlatform::stuck_building());

    let saver = Arc::new(SqliteStateSaver::new(Arc::new(db.pool().clone())));
    let executors = Arc::new(ExecutorSet::standard(
        Arc::new(StubAgent),
        Arc::new(StubChat),
        tracker.clone(),
        Arc::new(SlashCommands::new()),
    ));
    let interpreter = Arc::new(Interpreter::new(
        saver.clone(),
        Arc::new(EventBus::new()),
        executors,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        interpreter.clone(),
        platform.clone(),
        signer.clone(),
        Arc::new(db.pool().clone()),
        dispatcher_config,
    ));

    let automations = Arc::new(
        AutomationRouter::new(
            Arc::new(db.pool().clone()),
            dispatcher.clone(),
            tracker.clone(),
            Some(cipher.clone()),
        )
        .with_completion_timeout(Duration::from_secs(10)),
    );

    let state = AppState {
        db,
        saver,
        interpreter,
        dispatcher,
        automations,
        cipher,
        signer,
        registry: Arc::new(Registry::new()),
    };

    Harness {
        state,
        tracker,
        platform,
    }
}

/// Dispatcher config with millisecond-scale polling for tests.
pub fn fast_dispatch() -> DispatcherConfig {
    DispatcherConfig {
        poll_initial: Duration::from_millis(10),
        poll_max: Duration::from_millis(20),
        deploy_deadline: Duration::from_millis(100),
        endpoint_url: "http://127.0.0.1:0".to_string(),
        default_image: "test-runner:latest".to_string(),
    }
}
