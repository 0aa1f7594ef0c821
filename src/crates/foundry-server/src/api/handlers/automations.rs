//! Automation CRUD and manual-trigger handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{CreateAutomationRequest, ManualTriggerRequest, StatusChangeRequest};
use crate::api::routes::AppState;
use crate::automation::StatusChange;
use crate::db::repositories::AutomationRepository;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationListQuery {
    pub project_id: String,
}

/// POST /api/v1/automations
pub async fn create_automation(
    State(app): State<AppState>,
    Json(req): Json<CreateAutomationRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let automation = req.into_automation(Uuid::new_v4().to_string())?;
    AutomationRepository::create(app.db.pool(), &automation).await?;
    let created = AutomationRepository::get_by_id(app.db.pool(), &automation.id)
        .await?
        .ok_or_else(|| ApiError::Internal("automation vanished after create".into()))?;
    tracing::info!(automation = %created.id, "automation created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/automations?projectId=
pub async fn list_automations(
    State(app): State<AppState>,
    Query(query): Query<AutomationListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let automations = AutomationRepository::list(app.db.pool(), &query.project_id).await?;
    Ok(Json(automations))
}

/// GET /api/v1/automations/:id
pub async fn get_automation(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let automation = AutomationRepository::get_by_id(app.db.pool(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("automation '{id}'")))?;
    Ok(Json(automation))
}

/// PUT /api/v1/automations/:id
pub async fn update_automation(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateAutomationRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let automation = req.into_automation(id.clone())?;
    AutomationRepository::update(app.db.pool(), &automation).await?;
    let updated = AutomationRepository::get_by_id(app.db.pool(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("automation '{id}'")))?;
    tracing::info!(automation = %id, "automation updated");
    Ok(Json(updated))
}

/// DELETE /api/v1/automations/:id
pub async fn delete_automation(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    AutomationRepository::delete(app.db.pool(), &id).await?;
    tracing::info!(automation = %id, "automation deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/automations/trigger — explicit manual invocation.
pub async fn trigger_automation(
    State(app): State<AppState>,
    Json(req): Json<ManualTriggerRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let execution_id = app
        .automations
        .trigger_manual(&req.automation_id, &req.issue_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"executionId": execution_id})),
    ))
}

/// POST /api/v1/status-changes — inbound feed from the project sync
/// component. Matching automations run in the background.
pub async fn post_status_change(
    State(app): State<AppState>,
    Json(req): Json<StatusChangeRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let change = StatusChange {
        project_id: req.project_id,
        issue_id: req.issue_id,
        previous_status: req.previous_status,
        new_status: req.new_status,
        issue: req.issue,
    };
    let router = app.automations.clone();
    tokio::spawn(async move {
        if let Err(e) = router.handle_status_change(change).await {
            tracing::error!(error = %e, "status-change handling failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}
