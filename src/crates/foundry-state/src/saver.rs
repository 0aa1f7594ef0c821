//! Backend-agnostic state persistence trait
//!
//! The interpreter checkpoints through [`StateSaver`]; backends decide where
//! the blob lands (in memory for tests, SQLite in the server). A backend must
//! provide atomic writes per state and enforce the single-active-execution
//! invariant: at most one `running` execution per `(workflow_id, project_id)`.

use crate::state::ExecutionState;
use crate::status::ExecutionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for saver operations.
pub type Result<T> = std::result::Result<T, SaverError>;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum SaverError {
    /// Another execution for the same workflow/project is already `running`.
    #[error("an execution for workflow '{workflow_id}' in project '{project_id}' is already running")]
    ActiveConflict {
        workflow_id: String,
        project_id: String,
    },

    #[error("execution not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure (I/O, SQL, ...).
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for SaverError {
    fn from(err: serde_json::Error) -> Self {
        SaverError::Serialization(err.to_string())
    }
}

/// Storage backend for execution state.
#[async_trait]
pub trait StateSaver: Send + Sync {
    /// Persist a brand-new execution. Fails with
    /// [`SaverError::ActiveConflict`] when the single-active invariant would
    /// be violated.
    async fn insert(&self, state: &ExecutionState) -> Result<()>;

    /// Checkpoint an existing execution with a single atomic write. The
    /// active-status invariant is re-checked when the state is `running`.
    async fn save(&self, state: &ExecutionState) -> Result<()>;

    /// Load an execution by id.
    async fn load(&self, id: &str) -> Result<Option<ExecutionState>>;

    /// List executions, optionally filtered.
    async fn list(
        &self,
        workflow_id: Option<&str>,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<ExecutionState>>;

    /// `running` executions whose `last_activity_at` is older than `cutoff`;
    /// the recovery sweeper marks these failed.
    async fn stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExecutionState>>;
}
