//! Execution lifecycle endpoint handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::{ensure_attached, prepare_execution, spawn_run};
use crate::api::models::{
    AnswerRequest, ExecutionResponse, RetryStepRequest, SkipQuestionRequest,
    StartExecutionRequest, StartExecutionResponse, StepHistoryResponse,
};
use crate::api::routes::AppState;
use crate::db::repositories::WorkflowRepository;
use foundry_state::{ExecutionStatus, StateSaver};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionListQuery {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// POST /api/v1/executions
pub async fn start_execution(
    State(app): State<AppState>,
    Json(req): Json<StartExecutionRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let row = WorkflowRepository::get_by_id(app.db.pool(), &req.workflow_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("workflow '{}'", req.workflow_id)))?;

    let (plan, context, env, mode) = prepare_execution(&app, &row, req.initial_context.as_ref())?;
    let execution_id = app.dispatcher.execute(plan, context, env, mode).await?;

    tracing::info!(execution = %execution_id, workflow = %req.workflow_id, "execution started");
    Ok((
        StatusCode::CREATED,
        Json(StartExecutionResponse { execution_id }),
    ))
}

/// GET /api/v1/executions
pub async fn list_executions(
    State(app): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            ExecutionStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{s}'")))
        })
        .transpose()?;

    let states = app
        .saver
        .list(query.workflow_id.as_deref(), status)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let responses: Vec<ExecutionResponse> =
        states.iter().map(ExecutionResponse::from_state).collect();
    Ok(Json(responses))
}

/// GET /api/v1/executions/:id
pub async fn get_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let state = app
        .interpreter
        .get_state(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("execution '{id}'")))?;
    Ok(Json(ExecutionResponse::from_state(&state)))
}

/// GET /api/v1/executions/:id/history
pub async fn get_step_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let state = app
        .interpreter
        .get_state(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("execution '{id}'")))?;
    Ok(Json(StepHistoryResponse {
        execution_id: id,
        steps: state.step_history,
    }))
}

/// POST /api/v1/executions/:id/answer
pub async fn submit_answer(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    ensure_attached(&app, &id).await?;
    app.interpreter
        .submit_answer(&id, &req.question_id, req.value)
        .await?;
    spawn_run(&app, &id);
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/executions/:id/skip
pub async fn skip_question(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SkipQuestionRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    ensure_attached(&app, &id).await?;
    app.interpreter.skip_question(&id, &req.question_id).await?;
    spawn_run(&app, &id);
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/executions/:id/pause
pub async fn pause_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app.interpreter.pause(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/executions/:id/resume
pub async fn resume_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    ensure_attached(&app, &id).await?;
    app.interpreter.resume(&id).await?;
    spawn_run(&app, &id);
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/executions/:id/cancel
pub async fn cancel_execution(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app.dispatcher.cancel(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/executions/:id/retry
pub async fn retry_step(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RetryStepRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    ensure_attached(&app, &id).await?;
    app.interpreter.retry_step(&id, &req.node_id).await?;
    spawn_run(&app, &id);
    Ok(StatusCode::ACCEPTED)
}
