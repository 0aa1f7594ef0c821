//! Endpoint handlers

pub mod automations;
pub mod events;
pub mod executions;
pub mod health;
pub mod webhooks;
pub mod workflows;

pub use automations::*;
pub use events::*;
pub use executions::*;
pub use health::*;
pub use webhooks::*;
pub use workflows::*;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::models::WorkflowRow;
use crate::dispatcher::ExecutionMode;
use foundry_graph::{compile, Plan, WorkflowDocument};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Compile a stored workflow with extra context merged over its own.
/// Returns the plan, the merged context, the decrypted environment and the
/// execution mode.
pub(crate) fn prepare_execution(
    app: &AppState,
    row: &WorkflowRow,
    extra_context: Option<&Map<String, Value>>,
) -> ApiResult<(Arc<Plan>, Map<String, Value>, HashMap<String, String>, ExecutionMode)> {
    let doc = row.to_document()?;

    let mut context = doc.initial_context.clone();
    if let Some(extra) = extra_context {
        for (key, value) in extra {
            context.insert(key.clone(), value.clone());
        }
    }

    let env = match &row.encrypted_env {
        Some(blob) => app
            .cipher
            .decrypt_env(blob)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        None => HashMap::new(),
    };

    let plan = compile(&doc, &context, &app.registry).map_err(ApiError::Validation)?;

    let mode = if row.is_remote() {
        ExecutionMode::Remote
    } else {
        ExecutionMode::Local
    };

    Ok((Arc::new(plan), context, env, mode))
}

/// Make sure the interpreter has a plan attached for this execution,
/// recompiling from the stored workflow after a restart.
pub(crate) async fn ensure_attached(app: &AppState, execution_id: &str) -> ApiResult<()> {
    if app.interpreter.is_attached(execution_id) {
        return Ok(());
    }
    let state = app
        .interpreter
        .get_state(execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("execution '{execution_id}'")))?;

    let row = crate::db::repositories::WorkflowRepository::get_by_id(
        app.db.pool(),
        &state.workflow_id,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("workflow '{}'", state.workflow_id)))?;

    let (plan, _context, env, _mode) = prepare_execution(app, &row, None)?;
    app.interpreter.attach(execution_id, plan, env).await?;
    Ok(())
}

/// Resume driving an execution in the background.
pub(crate) fn spawn_run(app: &AppState, execution_id: &str) {
    let interpreter = app.interpreter.clone();
    let id = execution_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = interpreter.run(&id).await {
            tracing::error!(execution = %id, error = %e, "run aborted");
        }
    });
}

/// Synthetic document used by the body-validate endpoint.
pub(crate) fn synthetic_document(nodes: Value, edges: Value, initial: Option<Map<String, Value>>) -> ApiResult<WorkflowDocument> {
    serde_json::from_value(serde_json::json!({
        "id": "candidate",
        "projectId": "candidate",
        "name": "candidate",
        "nodes": nodes,
        "edges": edges,
        "initialContext": initial.unwrap_or_default(),
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "updatedAt": chrono::Utc::now().to_rfc3339(),
    }))
    .map_err(|e| ApiError::BadRequest(format!("malformed workflow document: {e}")))
}
