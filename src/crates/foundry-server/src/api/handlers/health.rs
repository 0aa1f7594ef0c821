//! Health check endpoint

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use axum::{extract::State, Json};
use serde_json::json;

/// GET /health
pub async fn health(State(app): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    app.db
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("database unreachable: {e}")))?;
    Ok(Json(json!({"status": "ok"})))
}
