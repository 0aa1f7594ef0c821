//! Workflow CRUD, duplicate and validate endpoint handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::synthetic_document;
use crate::api::models::{
    CreateWorkflowRequest, UpdateWorkflowRequest, ValidateWorkflowRequest, WorkflowResponse,
};
use crate::api::routes::AppState;
use crate::db::repositories::WorkflowRepository;
use foundry_graph::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowListQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

/// POST /api/v1/workflows
pub async fn create_workflow(
    State(app): State<AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;

    let encrypted_env = req
        .environment
        .as_ref()
        .map(|vars| app.cipher.encrypt_env(vars))
        .transpose()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let row = WorkflowRepository::create(
        app.db.pool(),
        Uuid::new_v4().to_string(),
        req.project_id,
        req.name,
        req.description,
        req.nodes.to_string(),
        req.edges.to_string(),
        serde_json::to_string(&req.initial_context.unwrap_or_default())
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        encrypted_env,
        req.docker_image,
        req.remote_execution,
    )
    .await?;

    tracing::info!(workflow = %row.id, "workflow created");
    Ok((StatusCode::CREATED, Json(WorkflowResponse::from_row(row)?)))
}

/// GET /api/v1/workflows
pub async fn list_workflows(
    State(app): State<AppState>,
    Query(query): Query<WorkflowListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let rows = WorkflowRepository::list(app.db.pool(), query.project_id.as_deref()).await?;
    let responses = rows
        .into_iter()
        .map(WorkflowResponse::from_row)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(responses))
}

/// GET /api/v1/workflows/:id
pub async fn get_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let row = WorkflowRepository::get_by_id(app.db.pool(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("workflow '{id}'")))?;
    Ok(Json(WorkflowResponse::from_row(row)?))
}

/// PUT /api/v1/workflows/:id
pub async fn update_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !req.has_updates() {
        return Err(ApiError::BadRequest("no fields to update".into()));
    }

    let encrypted_env = req
        .environment
        .as_ref()
        .map(|vars| app.cipher.encrypt_env(vars))
        .transpose()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let row = WorkflowRepository::update(
        app.db.pool(),
        &id,
        req.name,
        req.description,
        req.nodes.map(|n| n.to_string()),
        req.edges.map(|e| e.to_string()),
        req.initial_context
            .map(|c| serde_json::to_string(&c))
            .transpose()
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        encrypted_env,
        req.docker_image,
        req.remote_execution,
    )
    .await?;

    tracing::info!(workflow = %id, "workflow updated");
    Ok(Json(WorkflowResponse::from_row(row)?))
}

/// DELETE /api/v1/workflows/:id
///
/// Refused while executions reference the workflow; cascading delete
/// requires deleting the whole project.
pub async fn delete_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if WorkflowRepository::has_executions(app.db.pool(), &id).await? {
        return Err(ApiError::Conflict(format!(
            "workflow '{id}' is referenced by executions"
        )));
    }
    WorkflowRepository::delete(app.db.pool(), &id).await?;
    tracing::info!(workflow = %id, "workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/workflows/:id/duplicate
pub async fn duplicate_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let copy = WorkflowRepository::duplicate(app.db.pool(), &id).await?;
    tracing::info!(source = %id, copy = %copy.id, "workflow duplicated");
    Ok((StatusCode::CREATED, Json(WorkflowResponse::from_row(copy)?)))
}

/// POST /api/v1/workflows/:id/validate — validate the stored graph.
pub async fn validate_stored_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let row = WorkflowRepository::get_by_id(app.db.pool(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("workflow '{id}'")))?;
    let doc = row.to_document()?;
    let issues = validate(&doc, &app.registry);
    Ok(Json(json!({"issues": issues})))
}

/// POST /api/v1/workflows/validate — validate a candidate graph without
/// persisting anything.
pub async fn validate_workflow_body(
    State(app): State<AppState>,
    Json(req): Json<ValidateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let doc = synthetic_document(req.nodes, req.edges, req.initial_context)?;
    let issues = validate(&doc, &app.registry);
    Ok(Json(json!({"issues": issues})))
}
