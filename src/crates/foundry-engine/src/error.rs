//! Engine error taxonomy
//!
//! The closed set of failure kinds an execution can record. Every variant
//! maps to a stable machine-readable kind string via [`EngineError::kind`],
//! which is what lands in `last_error.kind` and in step history. Retries are
//! never implicit: [`EngineError::is_retryable`] only states whether a
//! user-initiated `retry_step` is allowed to target the failure.

use foundry_state::SaverError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures raised by the interpreter, executors and dispatch plumbing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required input port could not be resolved from port data.
    #[error("input port '{port}' on node '{node}' could not be resolved")]
    PortUnresolved { node: String, port: String },

    /// A `${...}` template variable did not resolve.
    #[error("unresolved template variable: {0}")]
    Template(String),

    /// An eval node or dynamic expression failed.
    #[error("eval failed: {0}")]
    Eval(String),

    /// JSON-mode LLM output failed schema validation.
    #[error("LLM output validation failed: {0}")]
    LlmValidation(String),

    /// Upstream model/agent provider failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Container-hosting platform failure.
    #[error("platform error: {0}")]
    Platform(String),

    /// Project-tracking API failure.
    #[error("project API error: {0}")]
    ProjectApi(String),

    /// A command executor hit its timeout.
    #[error("command timed out after {seconds}s")]
    CommandTimeout { seconds: u64 },

    /// The workflow-wide deadline elapsed.
    #[error("workflow deadline exceeded")]
    WorkflowTimeout,

    /// Remote deployment did not reach a terminal state in time.
    #[error("deployment did not become ready before the deadline")]
    DeploymentTimeout,

    /// A webhook failed token verification. Dropped without state change.
    #[error("webhook authorization failed: {0}")]
    UnauthorizedWebhook(String),

    /// A running execution went silent past the staleness threshold.
    #[error("execution went stale")]
    StaleExecution,

    /// The execution was cancelled before this step.
    #[error("execution cancelled")]
    Cancelled,

    /// The request conflicts with current state (wrong status, duplicate
    /// answer after advancing, concurrent active execution).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// State persistence failure.
    #[error(transparent)]
    State(#[from] SaverError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable kind, recorded as `last_error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::PortUnresolved { .. } => "PortUnresolved",
            EngineError::Template(_) => "TemplateError",
            EngineError::Eval(_) => "EvalError",
            EngineError::LlmValidation(_) => "LLMValidationError",
            EngineError::Provider(_) => "ProviderError",
            EngineError::Platform(_) => "PlatformError",
            EngineError::ProjectApi(_) => "ProjectApiError",
            EngineError::CommandTimeout { .. } => "CommandTimeout",
            EngineError::WorkflowTimeout => "WorkflowTimeout",
            EngineError::DeploymentTimeout => "DeploymentTimeout",
            EngineError::UnauthorizedWebhook(_) => "UnauthorizedWebhook",
            EngineError::StaleExecution => "StaleExecution",
            EngineError::Cancelled => "Cancelled",
            EngineError::Conflict(_) => "Conflict",
            EngineError::NotFound(_) => "NotFound",
            EngineError::State(SaverError::ActiveConflict { .. }) => "Conflict",
            EngineError::State(SaverError::NotFound(_)) => "NotFound",
            EngineError::State(_) => "InternalError",
            EngineError::Internal(_) => "InternalError",
        }
    }

    /// Whether `retry_step` may target this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            EngineError::Cancelled | EngineError::StaleExecution | EngineError::UnauthorizedWebhook(_)
        )
    }
}

impl From<foundry_graph::GraphError> for EngineError {
    fn from(err: foundry_graph::GraphError) -> Self {
        match err {
            foundry_graph::GraphError::Template(var) => EngineError::Template(var),
            foundry_graph::GraphError::ExprParse(msg) => EngineError::Eval(msg),
            foundry_graph::GraphError::Validation(issues) => {
                EngineError::Internal(format!("unexpected validation failure: {issues:?}"))
            }
        }
    }
}

impl From<foundry_llm::LlmError> for EngineError {
    fn from(err: foundry_llm::LlmError) -> Self {
        match err {
            foundry_llm::LlmError::SchemaValidation(detail) => EngineError::LlmValidation(detail),
            other => EngineError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(
            EngineError::PortUnresolved {
                node: "llm".into(),
                port: "prompt".into()
            }
            .kind(),
            "PortUnresolved"
        );
        assert_eq!(EngineError::LlmValidation("x".into()).kind(), "LLMValidationError");
        assert_eq!(EngineError::CommandTimeout { seconds: 5 }.kind(), "CommandTimeout");
        assert_eq!(EngineError::Cancelled.kind(), "Cancelled");
    }

    #[test]
    fn test_retryability() {
        assert!(EngineError::DeploymentTimeout.is_retryable());
        assert!(EngineError::Provider("boom".into()).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(!EngineError::StaleExecution.is_retryable());
    }

    #[test]
    fn test_llm_error_mapping() {
        let err: EngineError = foundry_llm::LlmError::SchemaValidation("missing".into()).into();
        assert_eq!(err.kind(), "LLMValidationError");
        let err: EngineError = foundry_llm::LlmError::Provider("down".into()).into();
        assert_eq!(err.kind(), "ProviderError");
    }
}
