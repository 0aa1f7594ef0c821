//! In-memory state saver
//!
//! Reference backend used by unit tests and local single-process runs. All
//! operations go through one lock, which also makes the insert-then-check of
//! the single-active invariant atomic.

use crate::saver::{Result, SaverError, StateSaver};
use crate::state::ExecutionState;
use crate::status::ExecutionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Lock-protected map of execution id → checkpointed state.
#[derive(Default)]
pub struct InMemoryStateSaver {
    inner: RwLock<HashMap<String, ExecutionState>>,
}

impl InMemoryStateSaver {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_active(
        map: &HashMap<String, ExecutionState>,
        candidate: &ExecutionState,
    ) -> Result<()> {
        if candidate.status != ExecutionStatus::Running {
            return Ok(());
        }
        let conflict = map.values().any(|existing| {
            existing.id != candidate.id
                && existing.status == ExecutionStatus::Running
                && existing.workflow_id == candidate.workflow_id
                && existing.project_id == candidate.project_id
        });
        if conflict {
            return Err(SaverError::ActiveConflict {
                workflow_id: candidate.workflow_id.clone(),
                project_id: candidate.project_id.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StateSaver for InMemoryStateSaver {
    async fn insert(&self, state: &ExecutionState) -> Result<()> {
        let mut map = self.inner.write();
        Self::check_active(&map, state)?;
        map.insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn save(&self, state: &ExecutionState) -> Result<()> {
        let mut map = self.inner.write();
        if !map.contains_key(&state.id) {
            return Err(SaverError::NotFound(state.id.clone()));
        }
        Self::check_active(&map, state)?;
        map.insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<ExecutionState>> {
        Ok(self.inner.read().get(id).cloned())
    }

    async fn list(
        &self,
        workflow_id: Option<&str>,
        status: Option<ExecutionStatus>,
    ) -> Result<Vec<ExecutionState>> {
        let map = self.inner.read();
        let mut out: Vec<ExecutionState> = map
            .values()
            .filter(|s| workflow_id.map_or(true, |w| s.workflow_id == w))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(out)
    }

    async fn stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExecutionState>> {
        let map = self.inner.read();
        Ok(map
            .values()
            .filter(|s| s.status == ExecutionStatus::Running)
            .filter(|s| {
                DateTime::parse_from_rfc3339(&s.last_activity_at)
                    .map(|t| t.with_timezone(&Utc) < cutoff)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn running(workflow: &str, project: &str) -> ExecutionState {
        let mut state = ExecutionState::new(workflow, project);
        state.transition(ExecutionStatus::Running);
        state
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let saver = InMemoryStateSaver::new();
        let state = running("wf", "proj");
        saver.insert(&state).await.unwrap();
        let loaded = saver.load(&state.id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_single_active_execution_enforced() {
        let saver = InMemoryStateSaver::new();
        saver.insert(&running("wf", "proj")).await.unwrap();

        let err = saver.insert(&running("wf", "proj")).await.unwrap_err();
        assert!(matches!(err, SaverError::ActiveConflict { .. }));

        // a different workflow or project is fine
        saver.insert(&running("wf", "proj-2")).await.unwrap();
        saver.insert(&running("wf-2", "proj")).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_rechecks_active_invariant() {
        let saver = InMemoryStateSaver::new();
        let first = running("wf", "proj");
        saver.insert(&first).await.unwrap();

        let mut second = ExecutionState::new("wf", "proj");
        saver.insert(&second).await.unwrap();
        second.transition(ExecutionStatus::Running);
        let err = saver.save(&second).await.unwrap_err();
        assert!(matches!(err, SaverError::ActiveConflict { .. }));
    }

    #[tokio::test]
    async fn test_save_unknown_execution_fails() {
        let saver = InMemoryStateSaver::new();
        let state = running("wf", "proj");
        assert!(matches!(
            saver.save(&state).await.unwrap_err(),
            SaverError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_running_filter() {
        let saver = InMemoryStateSaver::new();
        let mut stale = running("wf", "proj");
        stale.last_activity_at = (Utc::now() - Duration::minutes(30)).to_rfc3339();
        saver.insert(&stale).await.unwrap();

        let fresh = running("wf-2", "proj");
        saver.insert(&fresh).await.unwrap();

        let found = saver
            .stale_running(Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }
}
