//! Foundry server binary
//!
//! Wires configuration, the SQLite store, the interpreter with the standard
//! executor set, the remote dispatcher and the automation router, then
//! serves the API with graceful shutdown. Background sweeps reclaim stale
//! executions and leaked automation locks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use foundry_engine::{EventBus, ExecutorSet, Interpreter, ProjectTracker, SlashCommands};
use foundry_graph::Registry;
use foundry_llm::{AnthropicClient, ChatModel, OpenAiClient, ProviderConfig};
use foundry_server::api::{create_router, AppState};
use foundry_server::automation::AutomationRouter;
use foundry_server::db::DatabaseConnection;
use foundry_server::dispatcher::{Dispatcher, DispatcherConfig};
use foundry_server::integrations::{ChatAgentProvider, HttpProjectTracker, LoggingTracker};
use foundry_server::platform::HttpContainerPlatform;
use foundry_server::secrets::EnvCipher;
use foundry_server::store::SqliteStateSaver;
use foundry_server::token::TokenSigner;
use foundry_server::ServerConfig;

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const STALE_THRESHOLD: Duration = Duration::from_secs(1800);
const LOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const LOCK_TTL: Duration = Duration::from_secs(7200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("loading server configuration");
    let config = ServerConfig::from_env()?;

    tracing::info!(database = %config.database_url, "connecting to database");
    let db = DatabaseConnection::new(&config.database_url).await?;
    db.init_schema().await?;
    db.health_check().await?;

    let cipher = Arc::new(EnvCipher::from_base64_key(&config.encryption_key)?);
    let signer = Arc::new(TokenSigner::new(&config.token_secret));

    let chat = chat_provider()?;
    let agent_provider = Arc::new(ChatAgentProvider::new(
        chat.clone(),
        std::env::var("FOUNDRY_AGENT_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
    ));
    let tracker = project_tracker();
    let slash_commands = Arc::new(SlashCommands::new());

    let saver = Arc::new(SqliteStateSaver::new(Arc::new(db.pool().clone())));
    let bus = Arc::new(EventBus::new());
    let executors = Arc::new(ExecutorSet::standard(
        agent_provider,
        chat,
        tracker.clone(),
        slash_commands,
    ));
    let interpreter = Arc::new(Interpreter::new(saver.clone(), bus, executors));

    let platform = Arc::new(HttpContainerPlatform::new(
        config.platform_base_url.clone(),
        config.platform_api_token.clone(),
        config.platform_project_id.clone(),
        config.platform_environment_id.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        interpreter.clone(),
        platform,
        signer.clone(),
        Arc::new(db.pool().clone()),
        DispatcherConfig {
            endpoint_url: config.endpoint_url.clone(),
            default_image: config.default_image.clone(),
            ..DispatcherConfig::default()
        },
    ));

    let automations = Arc::new(AutomationRouter::new(
        Arc::new(db.pool().clone()),
        dispatcher.clone(),
        tracker,
        Some(cipher.clone()),
    ));

    spawn_sweepers(interpreter.clone(), automations.clone());

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

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!(%addr, "starting foundry server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("foundry server shut down gracefully");
    Ok(())
}

/// Pick a chat provider from the environment: Anthropic when its key is set,
/// otherwise OpenAI.
fn chat_provider() -> anyhow::Result<Arc<dyn ChatModel>> {
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        let config = ProviderConfig::from_env("ANTHROPIC_API_KEY", "https://api.anthropic.com")?;
        return Ok(Arc::new(AnthropicClient::new(config)?));
    }
    let config = ProviderConfig::from_env("OPENAI_API_KEY", "https://api.openai.com")?;
    Ok(Arc::new(OpenAiClient::new(config)?))
}

/// Project tracker: REST client when configured, logging no-op otherwise.
fn project_tracker() -> Arc<dyn ProjectTracker> {
    match (
        std::env::var("FOUNDRY_TRACKER_URL"),
        std::env::var("FOUNDRY_TRACKER_TOKEN"),
    ) {
        (Ok(url), Ok(token)) => Arc::new(HttpProjectTracker::new(url, token)),
        _ => {
            tracing::warn!("no project tracker configured; status write-backs are no-ops");
            Arc::new(LoggingTracker)
        }
    }
}

fn spawn_sweepers(interpreter: Arc<Interpreter>, automations: Arc<AutomationRouter>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STALE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match interpreter.sweep_stale(STALE_THRESHOLD).await {
                Ok(0) => {}
                Ok(count) => tracing::warn!(count, "swept stale executions"),
                Err(e) => tracing::error!(error = %e, "stale sweep failed"),
            }
        }
    });
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LOCK_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match automations.sweep_locks(LOCK_TTL).await {
                Ok(0) => {}
                Ok(count) => tracing::warn!(count, "reclaimed leaked automation locks"),
                Err(e) => tracing::error!(error = %e, "lock sweep failed"),
            }
        }
    });
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received CTRL-C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
