//! Automation router
//!
//! Subscribes to issue status transitions from the project-sync component,
//! matches them against per-project automation rules, and launches workflow
//! executions with the issue metadata as initial context. At most one
//! automation execution per issue is active at any time, enforced by the
//! `automation_locks` primary key. On terminal completion the automation's
//! transitions (or the plan's resolved end-node status) decide the status
//! written back to the external tracker.

use crate::db::models::{Automation, TransitionCondition};
use crate::db::repositories::{AutomationRepository, LockRepository, WorkflowRepository};
use crate::db::DatabasePool;
use crate::dispatcher::{Dispatcher, ExecutionMode};
use crate::secrets::EnvCipher;
use foundry_engine::{EngineError, Interpreter, ProjectTracker, Result};
use foundry_graph::{compile, Expr, Registry};
use foundry_state::{ExecutionState, ExecutionStatus};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Issue status transition observed by the project sync component.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub project_id: String,
    pub issue_id: String,
    pub previous_status: String,
    pub new_status: String,
    /// Issue metadata: owner, repo, number, title, body, labels, assignees.
    pub issue: Value,
}

/// Per-automation result of handling one status change.
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationOutcome {
    Started {
        automation_id: String,
        execution_id: String,
        written_status: Option<String>,
    },
    /// Another execution already holds the issue lock.
    Suppressed { automation_id: String },
}

pub struct AutomationRouter {
    pool: Arc<DatabasePool>,
    dispatcher: Arc<Dispatcher>,
    interpreter: Arc<Interpreter>,
    tracker: Arc<dyn ProjectTracker>,
    cipher: Option<Arc<EnvCipher>>,
    registry: Registry,
    /// How often the completion watcher polls execution state.
    poll_interval: Duration,
    /// How long the watcher waits for a terminal status before giving up.
    completion_timeout: Duration,
}

impl AutomationRouter {
    pub fn new(
        pool: Arc<DatabasePool>,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<dyn ProjectTracker>,
        cipher: Option<Arc<EnvCipher>>,
    ) -> Self {
        let interpreter = dispatcher.interpreter();
        Self {
            pool,
            dispatcher,
            interpreter,
            tracker,
            cipher,
            registry: Registry::new(),
            poll_interval: Duration::from_millis(100),
            completion_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Handle one status-change event: run every matching automation in
    /// priority order, waiting for each to finish and writing its transition
    /// status back to the tracker.
    pub async fn handle_status_change(&self, change: StatusChange) -> Result<Vec<AutomationOutcome>> {
        let automations =
            AutomationRepository::matching(&self.pool, &change.project_id, &change.new_status)
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))?;

        let mut outcomes = Vec::with_capacity(automations.len());
        for automation in automations {
            let outcome = self.run_locked(&automation, &change.issue_id, self.build_context(&change)).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Explicit invocation of an automation for an issue (manual triggers
    /// bypass status matching). Returns the execution id immediately; the
    /// transition write-back runs in the background.
    pub async fn trigger_manual(&self, automation_id: &str, issue_id: &str) -> Result<String> {
        let automation = AutomationRepository::get_by_id(&self.pool, automation_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("automation '{automation_id}'")))?;
        if !automation.enabled {
            return Err(EngineError::Conflict(format!(
                "automation '{automation_id}' is disabled"
            )));
        }

        let mut context = Map::new();
        context.insert("project".to_string(), json!(automation.project_id));
        context.insert("issueId".to_string(), json!(issue_id));

        if !LockRepository::try_acquire(&self.pool, &automation.project_id, issue_id, "pending")
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
        {
            return Err(EngineError::Conflict(format!(
                "issue '{issue_id}' already has an active automation execution"
            )));
        }

        let execution_id = match self.launch(&automation, issue_id, context).await {
            Ok(id) => id,
            Err(e) => {
                let _ = LockRepository::release(&self.pool, &automation.project_id, issue_id).await;
                return Err(e);
            }
        };

        // finish in the background so the API call returns the id promptly
        let watcher = CompletionWatcher {
            pool: self.pool.clone(),
            interpreter: self.interpreter.clone(),
            tracker: self.tracker.clone(),
            poll_interval: self.poll_interval,
            timeout: self.completion_timeout,
        };
        let issue = issue_id.to_string();
        let execution = execution_id.clone();
        tokio::spawn(async move {
            if let Err(e) = watcher.finish(&automation, &issue, &execution).await {
                tracing::error!(execution = %execution, error = %e, "automation write-back failed");
            }
        });

        Ok(execution_id)
    }

    /// Reclaim leaked per-issue locks.
    pub async fn sweep_locks(&self, ttl: Duration) -> Result<u64> {
        LockRepository::sweep_expired(
            &self.pool,
            chrono::Duration::from_std(ttl).map_err(|e| EngineError::Internal(e.to_string()))?,
        )
        .await
        .map_err(|e| EngineError::Internal(e.to_string()))
    }

    fn build_context(&self, change: &StatusChange) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("project".to_string(), json!(change.project_id));
        context.insert("issueId".to_string(), json!(change.issue_id));
        context.insert("previousStatus".to_string(), json!(change.previous_status));
        context.insert("newStatus".to_string(), json!(change.new_status));
        context.insert("issue".to_string(), change.issue.clone());
        context
    }

    async fn run_locked(
        &self,
        automation: &Automation,
        issue_id: &str,
        context: Map<String, Value>,
    ) -> Result<AutomationOutcome> {
        let acquired =
            LockRepository::try_acquire(&self.pool, &automation.project_id, issue_id, "pending")
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))?;
        if !acquired {
            tracing::info!(
                automation = %automation.id,
                issue = %issue_id,
                "automation suppressed: issue already locked"
            );
            return Ok(AutomationOutcome::Suppressed {
                automation_id: automation.id.clone(),
            });
        }

        let result = async {
            let execution_id = self.launch(automation, issue_id, context).await?;
            let watcher = CompletionWatcher {
                pool: self.pool.clone(),
                interpreter: self.interpreter.clone(),
                tracker: self.tracker.clone(),
                poll_interval: self.poll_interval,
                timeout: self.completion_timeout,
            };
            let written = watcher.finish(automation, issue_id, &execution_id).await?;
            Ok::<_, EngineError>((execution_id, written))
        }
        .await;

        match result {
            Ok((execution_id, written_status)) => Ok(AutomationOutcome::Started {
                automation_id: automation.id.clone(),
                execution_id,
                written_status,
            }),
            Err(e) => {
                let _ = LockRepository::release(&self.pool, &automation.project_id, issue_id).await;
                Err(e)
            }
        }
    }

    /// Compile the automation's workflow and dispatch an execution.
    async fn launch(
        &self,
        automation: &Automation,
        issue_id: &str,
        context: Map<String, Value>,
    ) -> Result<String> {
        let row = WorkflowRepository::get_by_id(&self.pool, &automation.workflow_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .ok_or_else(|| {
                EngineError::NotFound(format!("workflow '{}'", automation.workflow_id))
            })?;
        let mode = if row.is_remote() {
            ExecutionMode::Remote
        } else {
            ExecutionMode::Local
        };

        let env = match (&row.encrypted_env, &self.cipher) {
            (Some(blob), Some(cipher)) => cipher
                .decrypt_env(blob)
                .map_err(|e| EngineError::Internal(e.to_string()))?,
            _ => HashMap::new(),
        };

        let doc = row
            .to_document()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let plan = compile(&doc, &context, &self.registry).map_err(|issues| {
            EngineError::Internal(format!("workflow failed validation: {issues:?}"))
        })?;

        let execution_id = self
            .dispatcher
            .execute(Arc::new(plan), context, env, mode)
            .await?;
        LockRepository::assign_execution(&self.pool, &automation.project_id, issue_id, &execution_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(execution_id)
    }
}

/// Waits for an execution to reach a terminal status, evaluates the
/// automation's transitions, writes the resulting status to the tracker and
/// releases the per-issue lock.
struct CompletionWatcher {
    pool: Arc<DatabasePool>,
    interpreter: Arc<Interpreter>,
    tracker: Arc<dyn ProjectTracker>,
    poll_interval: Duration,
    timeout: Duration,
}

impl CompletionWatcher {
    async fn finish(
        &self,
        automation: &Automation,
        issue_id: &str,
        execution_id: &str,
    ) -> Result<Option<String>> {
        let state = self.await_terminal(execution_id).await?;

        let next_status = match &state {
            Some(state) => pick_transition(automation, state),
            None => None,
        };

        if let Some(status) = &next_status {
            self.tracker
                .set_issue_status(&automation.project_id, issue_id, status)
                .await
                .map_err(EngineError::ProjectApi)?;
            tracing::info!(
                automation = %automation.id,
                issue = %issue_id,
                status = %status,
                "automation transition applied"
            );
        }

        LockRepository::release(&self.pool, &automation.project_id, issue_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(next_status)
    }

    async fn await_terminal(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let state = self
                .interpreter
                .get_state(execution_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("execution '{execution_id}'")))?;
            if state.status.is_terminal() {
                return Ok(Some(state));
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(execution = %execution_id, "gave up waiting for terminal status");
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// First matching transition in priority order, falling back to the plan's
/// resolved end-node status on success.
fn pick_transition(automation: &Automation, state: &ExecutionState) -> Option<String> {
    let completion_scope = json!({
        "status": state.status,
        "completionStatus": state.completion_status,
        "context": Value::Object(state.context.clone()),
        "lastError": state.last_error,
    });

    for transition in &automation.transitions {
        let matched = match transition.condition {
            TransitionCondition::Success => state.status == ExecutionStatus::Completed,
            TransitionCondition::Failure => state.status == ExecutionStatus::Failed,
            TransitionCondition::Custom => transition
                .custom_expression
                .as_deref()
                .and_then(|src| Expr::parse(src).ok())
                .map(|expr| foundry_graph::truthy(&expr.eval(&completion_scope)))
                .unwrap_or(false),
        };
        if matched {
            return Some(transition.next_status.clone());
        }
    }

    if state.status == ExecutionStatus::Completed {
        return state.completion_status.clone();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AutomationTransition, TriggerKind};

    fn automation_with(transitions: Vec<AutomationTransition>) -> Automation {
        Automation {
            id: "a1".into(),
            project_id: "proj".into(),
            name: "auto".into(),
            trigger_kind: TriggerKind::StatusEnter,
            trigger_status: Some("InProgress".into()),
            button_label: None,
            workflow_id: "wf".into(),
            enabled: true,
            priority: 0,
            transitions,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn transition(condition: TransitionCondition, next: &str, priority: i64) -> AutomationTransition {
        AutomationTransition {
            id: format!("t-{next}"),
            condition,
            custom_expression: None,
            next_status: next.to_string(),
            priority,
        }
    }

    fn completed_state() -> ExecutionState {
        let mut state = ExecutionState::new("wf", "proj");
        state.transition(ExecutionStatus::Running);
        state.transition(ExecutionStatus::Completed);
        state
    }

    #[test]
    fn test_success_transition_wins_on_completed() {
        let automation = automation_with(vec![
            transition(TransitionCondition::Failure, "Blocked", 0),
            transition(TransitionCondition::Success, "Review", 1),
        ]);
        assert_eq!(
            pick_transition(&automation, &completed_state()),
            Some("Review".to_string())
        );
    }

    #[test]
    fn test_failure_transition_on_failed() {
        let automation = automation_with(vec![transition(TransitionCondition::Failure, "Blocked", 0)]);
        let mut state = ExecutionState::new("wf", "proj");
        state.transition(ExecutionStatus::Running);
        state.transition(ExecutionStatus::Failed);
        assert_eq!(
            pick_transition(&automation, &state),
            Some("Blocked".to_string())
        );
    }

    #[test]
    fn test_custom_expression_matches_completion_context() {
        let mut custom = transition(TransitionCondition::Custom, "Escalated", 0);
        custom.custom_expression = Some("context.severity == 'high'".to_string());
        let automation = automation_with(vec![custom]);

        let mut state = completed_state();
        state.context.insert("severity".into(), json!("high"));
        assert_eq!(
            pick_transition(&automation, &state),
            Some("Escalated".to_string())
        );

        state.context.insert("severity".into(), json!("low"));
        assert_eq!(pick_transition(&automation, &state), None);
    }

    #[test]
    fn test_end_node_status_is_fallback() {
        let automation = automation_with(vec![]);
        let mut state = completed_state();
        state.completion_status = Some("Done".to_string());
        assert_eq!(
            pick_transition(&automation, &state),
            Some("Done".to_string())
        );
    }

    #[test]
    fn test_no_write_back_for_failed_without_rule() {
        let automation = automation_with(vec![transition(TransitionCondition::Success, "Review", 0)]);
        let mut state = ExecutionState::new("wf", "proj");
        state.transition(ExecutionStatus::Running);
        state.transition(ExecutionStatus::Failed);
        assert_eq!(pick_transition(&automation, &state), None);
    }
}
