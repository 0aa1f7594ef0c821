//! Container webhook receiver
//!
//! `POST /exec/:execution_id/event` with `Authorization: Bearer <token>`.
//! Verification failures drop the payload with 401 and no state change.
//! Containers fetch their materialised plan from
//! `GET /exec/:execution_id/plan` with the same bearer token.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::repositories::PlanRepository;
use crate::dispatcher::WebhookPayload;

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))
}

/// POST /exec/:execution_id/event
pub async fn receive_webhook(
    State(app): State<AppState>,
    Path(execution_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let token = bearer_token(&headers)?;
    app.dispatcher
        .handle_webhook(&execution_id, token, payload)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /exec/:execution_id/plan
pub async fn fetch_plan(
    State(app): State<AppState>,
    Path(execution_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    let token = bearer_token(&headers)?;
    app.signer
        .verify_for_execution(token, &execution_id)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let plan = PlanRepository::get(app.db.pool(), &execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("plan for execution '{execution_id}'")))?;
    Ok(Json(plan))
}
