//! SQLite-backed state saver
//!
//! Persists each execution as one row: the full checkpoint blob in `context`
//! plus mirror columns for querying. Every save is a single statement, and
//! the partial unique index on `(workflow_id, project_id) WHERE
//! status='running'` enforces the single-active invariant even across
//! process crashes.

use crate::db::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundry_state::{ExecutionState, ExecutionStatus, SaverError, StateSaver};
use std::sync::Arc;

pub struct SqliteStateSaver {
    pool: Arc<DatabasePool>,
}

impl SqliteStateSaver {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    fn map_error(state: &ExecutionState, err: sqlx::Error) -> SaverError {
        match &err {
            sqlx::Error::Database(db)
                if db.message().contains("UNIQUE constraint failed")
                    && db.message().contains("executions") =>
            {
                SaverError::ActiveConflict {
                    workflow_id: state.workflow_id.clone(),
                    project_id: state.project_id.clone(),
                }
            }
            _ => SaverError::Backend(err.to_string()),
        }
    }

    fn last_error_blob(state: &ExecutionState) -> Result<Option<String>, SaverError> {
        state
            .last_error
            .as_ref()
            .map(|e| serde_json::to_string(e).map_err(SaverError::from))
            .transpose()
    }
}

#[async_trait]
impl StateSaver for SqliteStateSaver {
    async fn insert(&self, state: &ExecutionState) -> foundry_state::Result<()> {
        let blob = state.checkpoint()?;
        let history = serde_json::to_string(&state.step_history)?;
        let last_error = Self::last_error_blob(state)?;

        sqlx::query(
            "INSERT INTO executions (id, workflow_id, project_id, status, current_node_id,
                 context, step_history, started_at, last_activity_at, paused_at,
                 completed_at, last_error, retry_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&state.id)
        .bind(&state.workflow_id)
        .bind(&state.project_id)
        .bind(state.status.as_str())
        .bind(&state.current_node_id)
        .bind(&blob)
        .bind(&history)
        .bind(&state.started_at)
        .bind(&state.last_activity_at)
        .bind(&state.paused_at)
        .bind(&state.completed_at)
        .bind(&last_error)
        .bind(state.retry_count as i64)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| Self::map_error(state, e))?;
        Ok(())
    }

    async fn save(&self, state: &ExecutionState) -> foundry_state::Result<()> {
        let blob = state.checkpoint()?;
        let history = serde_json::to_string(&state.step_history)?;
        let last_error = Self::last_error_blob(state)?;

        let result = sqlx::query(
            "UPDATE executions
             SET status = ?, current_node_id = ?, context = ?, step_history = ?,
                 last_activity_at = ?, paused_at = ?, completed_at = ?, last_error = ?,
                 retry_count = ?
             WHERE id = ?",
        )
        .bind(state.status.as_str())
        .bind(&state.current_node_id)
        .bind(&blob)
        .bind(&history)
        .bind(&state.last_activity_at)
        .bind(&state.paused_at)
        .bind(&state.completed_at)
        .bind(&last_error)
        .bind(state.retry_count as i64)
        .bind(&state.id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| Self::map_error(state, e))?;

        if result.rows_affected() == 0 {
            return Err(SaverError::NotFound(state.id.clone()));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> foundry_state::Result<Option<ExecutionState>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT context FROM executions WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool.as_ref())
                .await
                .map_err(|e| SaverError::Backend(e.to_string()))?;
        match row {
            Some((blob,)) => Ok(Some(ExecutionState::restore(&blob)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        workflow_id: Option<&str>,
        status: Option<ExecutionStatus>,
    ) -> foundry_state::Result<Vec<ExecutionState>> {
        let rows: Vec<(String,)> = match (workflow_id, status) {
            (Some(wf), Some(st)) => sqlx::query_as(
                "SELECT context FROM executions WHERE workflow_id = ? AND status = ?
                 ORDER BY started_at DESC",
            )
            .bind(wf)
            .bind(st.as_str())
            .fetch_all(self.pool.as_ref())
            .await,
            (Some(wf), None) => sqlx::query_as(
                "SELECT context FROM executions WHERE workflow_id = ? ORDER BY started_at DESC",
            )
            .bind(wf)
            .fetch_all(self.pool.as_ref())
            .await,
            (None, Some(st)) => sqlx::query_as(
                "SELECT context FROM executions WHERE status = ? ORDER BY started_at DESC",
            )
            .bind(st.as_str())
            .fetch_all(self.pool.as_ref())
            .await,
            (None, None) => {
                sqlx::query_as("SELECT context FROM executions ORDER BY started_at DESC")
                    .fetch_all(self.pool.as_ref())
                    .await
            }
        }
        .map_err(|e| SaverError::Backend(e.to_string()))?;

        rows.iter()
            .map(|(blob,)| ExecutionState::restore(blob).map_err(SaverError::from))
            .collect()
    }

    async fn stale_running(
        &self,
        cutoff: DateTime<Utc>,
    ) -> foundry_state::Result<Vec<ExecutionState>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT context FROM executions WHERE status = 'running' AND last_activity_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| SaverError::Backend(e.to_string()))?;

        rows.iter()
            .map(|(blob,)| ExecutionState::restore(blob).map_err(SaverError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;

    async fn saver() -> SqliteStateSaver {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.init_schema().await.unwrap();
        SqliteStateSaver::new(Arc::new(db.pool().clone()))
    }

    fn running(workflow: &str) -> ExecutionState {
        let mut state = ExecutionState::new(workflow, "proj");
        state.transition(ExecutionStatus::Running);
        state
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip_through_sqlite() {
        let saver = saver().await;
        let mut state = running("wf");
        state.context.insert("key".into(), serde_json::json!("value"));
        state.write_ports(
            "node",
            serde_json::from_value(serde_json::json!({"out": 1})).unwrap(),
        );
        saver.insert(&state).await.unwrap();

        let loaded = saver.load(&state.id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_partial_unique_index_enforces_single_active() {
        let saver = saver().await;
        saver.insert(&running("wf")).await.unwrap();

        let err = saver.insert(&running("wf")).await.unwrap_err();
        assert!(matches!(err, SaverError::ActiveConflict { .. }));

        // completed rows do not occupy the index
        let mut done = running("wf-2");
        saver.insert(&done).await.unwrap();
        done.transition(ExecutionStatus::Completed);
        saver.save(&done).await.unwrap();
        saver.insert(&running("wf-2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_missing_row_is_not_found() {
        let saver = saver().await;
        let state = running("wf");
        assert!(matches!(
            saver.save(&state).await.unwrap_err(),
            SaverError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let saver = saver().await;
        let a = running("wf-a");
        saver.insert(&a).await.unwrap();
        let mut b = running("wf-b");
        saver.insert(&b).await.unwrap();
        b.transition(ExecutionStatus::Failed);
        saver.save(&b).await.unwrap();

        assert_eq!(saver.list(Some("wf-a"), None).await.unwrap().len(), 1);
        assert_eq!(
            saver
                .list(None, Some(ExecutionStatus::Failed))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(saver.list(None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_running_query() {
        let saver = saver().await;
        let mut stale = running("wf-stale");
        stale.last_activity_at = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        saver.insert(&stale).await.unwrap();
        saver.insert(&running("wf-fresh")).await.unwrap();

        let found = saver
            .stale_running(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].workflow_id, "wf-stale");
    }
}
