//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::automation::AutomationRouter;
use crate::db::DatabaseConnection;
use crate::dispatcher::Dispatcher;
use crate::secrets::EnvCipher;
use crate::token::TokenSigner;
use foundry_engine::Interpreter;
use foundry_graph::Registry;
use foundry_state::StateSaver;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub saver: Arc<dyn StateSaver>,
    pub interpreter: Arc<Interpreter>,
    pub dispatcher: Arc<Dispatcher>,
    pub automations: Arc<AutomationRouter>,
    pub cipher: Arc<EnvCipher>,
    pub signer: Arc<TokenSigner>,
    pub registry: Arc<Registry>,
}

/// Build the complete API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Workflows
        .route(
            "/api/v1/workflows",
            post(handlers::create_workflow).get(handlers::list_workflows),
        )
        .route("/api/v1/workflows/validate", post(handlers::validate_workflow_body))
        .route(
            "/api/v1/workflows/:id",
            get(handlers::get_workflow)
                .put(handlers::update_workflow)
                .delete(handlers::delete_workflow),
        )
        .route(
            "/api/v1/workflows/:id/duplicate",
            post(handlers::duplicate_workflow),
        )
        .route(
            "/api/v1/workflows/:id/validate",
            post(handlers::validate_stored_workflow),
        )
        // Executions
        .route(
            "/api/v1/executions",
            post(handlers::start_execution).get(handlers::list_executions),
        )
        .route("/api/v1/executions/:id", get(handlers::get_execution))
        .route(
            "/api/v1/executions/:id/history",
            get(handlers::get_step_history),
        )
        .route(
            "/api/v1/executions/:id/events",
            get(handlers::stream_events),
        )
        .route("/api/v1/executions/:id/answer", post(handlers::submit_answer))
        .route("/api/v1/executions/:id/skip", post(handlers::skip_question))
        .route("/api/v1/executions/:id/pause", post(handlers::pause_execution))
        .route(
            "/api/v1/executions/:id/resume",
            post(handlers::resume_execution),
        )
        .route(
            "/api/v1/executions/:id/cancel",
            post(handlers::cancel_execution),
        )
        .route("/api/v1/executions/:id/retry", post(handlers::retry_step))
        // Automations
        .route(
            "/api/v1/automations",
            post(handlers::create_automation).get(handlers::list_automations),
        )
        .route(
            "/api/v1/automations/trigger",
            post(handlers::trigger_automation),
        )
        .route(
            "/api/v1/automations/:id",
            get(handlers::get_automation)
                .put(handlers::update_automation)
                .delete(handlers::delete_automation),
        )
        // Project-sync inbound feed
        .route("/api/v1/status-changes", post(handlers::post_status_change))
        // Remote container callbacks
        .route("/exec/:execution_id/event", post(handlers::receive_webhook))
        .route("/exec/:execution_id/plan", get(handlers::fetch_plan))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
