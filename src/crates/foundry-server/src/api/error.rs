//! API error types and HTTP response conversion
//!
//! Non-2xx bodies carry the `{error: {code, message, details?}}` envelope
//! with an upper-snake-case code from a closed set. Engine and database
//! errors convert into the envelope with the right status: validation 400,
//! not-found 404, duplicate/conflict 409, unauthorized 401, LLM and
//! deployment failures 502, everything else 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use foundry_engine::EngineError;
use foundry_graph::ValidationIssue;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::DatabaseError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<ValidationIssue>),

    #[error("{0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("deployment error: {0}")]
    Deployment(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Upper-snake-case wire code (closed set).
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::DuplicateId(_) => "DUPLICATE_ID",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Workflow(_) => "WORKFLOW_ERROR",
            ApiError::Llm(_) => "LLM_ERROR",
            ApiError::Deployment(_) => "DEPLOYMENT_ERROR",
            ApiError::Provider(_) => "PROVIDER_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateId(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Llm(_) | ApiError::Deployment(_) => StatusCode::BAD_GATEWAY,
            ApiError::Workflow(_) | ApiError::Provider(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Validation(issues) => serde_json::to_value(issues).ok(),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorEnvelope,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorEnvelope {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        tracing::debug!(code = self.code(), status = %status, "API error: {self}");
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::Conflict(_) => ApiError::Conflict(err.to_string()),
            EngineError::State(foundry_state::SaverError::ActiveConflict { .. }) => {
                ApiError::Conflict(err.to_string())
            }
            EngineError::State(foundry_state::SaverError::NotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            EngineError::UnauthorizedWebhook(_) => ApiError::Unauthorized(err.to_string()),
            EngineError::LlmValidation(_) => ApiError::Llm(err.to_string()),
            EngineError::Provider(_) | EngineError::ProjectApi(_) => {
                ApiError::Provider(err.to_string())
            }
            EngineError::Platform(_) | EngineError::DeploymentTimeout => {
                ApiError::Deployment(err.to_string())
            }
            EngineError::Internal(_) | EngineError::State(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Workflow(err.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match &err {
            DatabaseError::NotFound => ApiError::NotFound("row not found".to_string()),
            DatabaseError::Constraint(_) => ApiError::DuplicateId(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_graph::IssueCode;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::Validation(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::DuplicateId("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Llm("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Deployment("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Provider("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_details_carry_issues() {
        let err = ApiError::Validation(vec![ValidationIssue::new(
            IssueCode::EmptyGraph,
            "workflow has no nodes",
        )]);
        let details = err.details().unwrap();
        assert_eq!(details[0]["code"], "EMPTY_GRAPH");
    }

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::Conflict("busy".into()).into();
        assert_eq!(err.code(), "CONFLICT");
        let err: ApiError = EngineError::DeploymentTimeout.into();
        assert_eq!(err.code(), "DEPLOYMENT_ERROR");
        let err: ApiError = EngineError::UnauthorizedWebhook("bad sig".into()).into();
        assert_eq!(err.code(), "UNAUTHORIZED");
        let err: ApiError = EngineError::WorkflowTimeout.into();
        assert_eq!(err.code(), "WORKFLOW_ERROR");
    }
}
