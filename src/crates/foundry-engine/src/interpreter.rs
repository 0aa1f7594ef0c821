//! Plan interpreter
//!
//! Drives a compiled [`Plan`] to completion: resolves inputs from port data,
//! invokes the right executor, writes outputs back, picks the successor via
//! the node's transition, appends step history, and checkpoints after every
//! step through the [`StateSaver`]. `step()` is the sole suspension boundary;
//! pause and cancel signals are observed there and never interrupt an
//! in-flight executor call.

use crate::error::{EngineError, Result};
use crate::event::{EventBus, EventKind};
use crate::executor::{ActivitySink, ExecRequest, ExecutorSet, NextSelector};
use foundry_graph::{truthy, Expr, Plan, Registry, TransitionSpec, END};
use foundry_state::{
    ExecutionError, ExecutionState, ExecutionStatus, StateSaver, StepRecord, StepStatus,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What one `step()` did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A node ran and the execution moved to the next one.
    Advanced,
    /// The execution entered `waiting_user`.
    Suspended,
    /// A pause signal was observed.
    Paused,
    /// The END sentinel was reached; carries the resolved target status.
    Finished(Option<String>),
    /// The step failed; the state records the error.
    Failed,
    /// A cancel signal was observed before the step ran.
    Cancelled,
}

/// The transition resolution result.
enum Next {
    Node(String),
    /// Terminate; carries the end-node id that was reached, if known.
    End(Option<String>),
}

struct Session {
    plan: Arc<Plan>,
    env: HashMap<String, String>,
}

/// Single-writer interpreter over a state saver, an executor set and the
/// event bus. One instance owns all executions it started or attached.
pub struct Interpreter {
    saver: Arc<dyn StateSaver>,
    bus: Arc<EventBus>,
    executors: Arc<ExecutorSet>,
    registry: Registry,
    sessions: RwLock<HashMap<String, Session>>,
    workflow_deadline: Option<Duration>,
}

impl Interpreter {
    pub fn new(saver: Arc<dyn StateSaver>, bus: Arc<EventBus>, executors: Arc<ExecutorSet>) -> Self {
        Self {
            saver,
            bus,
            executors,
            registry: Registry::new(),
            sessions: RwLock::new(HashMap::new()),
            workflow_deadline: None,
        }
    }

    /// Optional workflow-wide deadline, enforced at step boundaries.
    pub fn with_workflow_deadline(mut self, deadline: Duration) -> Self {
        self.workflow_deadline = Some(deadline);
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Create and persist a new execution for a plan.
    pub async fn start(
        &self,
        plan: Arc<Plan>,
        initial_context: Map<String, Value>,
        env: HashMap<String, String>,
    ) -> Result<String> {
        let mut state = ExecutionState::new(&plan.workflow_id, &plan.project_id);
        state.context = initial_context;
        state.current_node_id = plan.entry.clone();
        for (node, ports) in &plan.initial_port_data {
            let map: Map<String, Value> = ports.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            state.write_ports(node, map);
        }
        state.transition(ExecutionStatus::Running);

        self.saver.insert(&state).await?;
        self.bus.register(&state.id, 0);
        self.sessions.write().insert(
            state.id.clone(),
            Session {
                plan,
                env,
            },
        );
        tracing::info!(execution = %state.id, workflow = %state.workflow_id, "execution started");
        Ok(state.id)
    }

    /// Re-attach a persisted execution after a restart: the plan and env are
    /// re-supplied, the event sequence continues from the checkpointed value.
    pub async fn attach(
        &self,
        execution_id: &str,
        plan: Arc<Plan>,
        env: HashMap<String, String>,
    ) -> Result<()> {
        let state = self.load(execution_id).await?;
        self.bus.register(execution_id, state.event_seq);
        self.sessions.write().insert(
            execution_id.to_string(),
            Session { plan, env },
        );
        Ok(())
    }

    /// Whether a plan is attached for this execution.
    pub fn is_attached(&self, execution_id: &str) -> bool {
        self.sessions.read().contains_key(execution_id)
    }

    pub async fn get_state(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        Ok(self.saver.load(execution_id).await?)
    }

    /// Advance the execution by one node.
    pub async fn step(&self, execution_id: &str) -> Result<StepOutcome> {
        let mut state = self.load(execution_id).await?;

        match state.status {
            ExecutionStatus::Running => {}
            ExecutionStatus::Paused => return Ok(StepOutcome::Paused),
            ExecutionStatus::WaitingUser => return Ok(StepOutcome::Suspended),
            ExecutionStatus::Completed => {
                return Ok(StepOutcome::Finished(state.completion_status.clone()))
            }
            ExecutionStatus::Failed => return Ok(StepOutcome::Failed),
            ExecutionStatus::Pending => {
                return Err(EngineError::Conflict("execution has not started".into()))
            }
        }

        if state.cancel_requested {
            self.fail(&mut state, EngineError::Cancelled, None).await?;
            return Ok(StepOutcome::Cancelled);
        }

        if let Some(deadline) = self.workflow_deadline {
            let started = chrono::DateTime::parse_from_rfc3339(&state.started_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            if Utc::now() - started > chrono::Duration::from_std(deadline).unwrap_or_default() {
                self.fail(&mut state, EngineError::WorkflowTimeout, None).await?;
                return Ok(StepOutcome::Failed);
            }
        }

        let plan = self.plan(execution_id)?;

        let Some(current) = state.current_node_id.clone() else {
            return self.complete(&mut state, None).await.map(StepOutcome::Finished);
        };

        if plan.is_end(&current) {
            let status = plan.target_status(&current).map(str::to_string);
            return self.complete(&mut state, status).await.map(StepOutcome::Finished);
        }

        let Some(node) = plan.node(&current).cloned() else {
            self.fail(
                &mut state,
                EngineError::Internal(format!("unknown node '{current}' in plan")),
                None,
            )
            .await?;
            return Ok(StepOutcome::Failed);
        };

        // Resolve inputs from port data via the plan's port mappings.
        let mut inputs = Map::new();
        if let Some(mappings) = plan.port_mappings.get(&current) {
            for (port, source) in mappings {
                match state.port_value(&source.node, &source.port) {
                    Some(value) => {
                        inputs.insert(port.clone(), value.clone());
                    }
                    None => {
                        let required = self
                            .registry
                            .ports_of(node.kind)
                            .and_then(|p| p.input(port))
                            .map(|p| p.required)
                            .unwrap_or(false);
                        if required {
                            let err = EngineError::PortUnresolved {
                                node: current.clone(),
                                port: port.clone(),
                            };
                            let now = Utc::now().to_rfc3339();
                            state.step_history.push(StepRecord {
                                id: uuid::Uuid::new_v4().to_string(),
                                node_id: current.clone(),
                                kind: node.kind.to_string(),
                                status: StepStatus::Failed,
                                started_at: now.clone(),
                                completed_at: now,
                                duration_ms: 0,
                                input: Value::Object(inputs.clone()),
                                output: Value::Null,
                                token_count: None,
                                error: Some(err.to_string()),
                            });
                            self.fail(&mut state, err, Some(&node)).await?;
                            return Ok(StepOutcome::Failed);
                        }
                    }
                }
            }
        }

        let started_at = Utc::now();
        self.bus.emit(
            execution_id,
            EventKind::StepStart {
                node_id: current.clone(),
                node_kind: node.kind.to_string(),
            },
        );

        let scope = build_scope(&state, &current, &inputs);
        let request = ExecRequest {
            execution_id: execution_id.to_string(),
            node: node.clone(),
            inputs: inputs.clone(),
            scope,
            env: self.env(execution_id),
        };
        let sink = ActivitySink::new(self.bus.clone(), execution_id, current.clone());

        let Some(executor) = self.executors.get(node.kind) else {
            self.fail(
                &mut state,
                EngineError::Internal(format!("no executor for kind '{}'", node.kind)),
                Some(&node),
            )
            .await?;
            return Ok(StepOutcome::Failed);
        };

        let result = executor.execute(&request, &sink).await;
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        match result {
            Ok(outcome) => {
                state.write_ports(&current, outcome.outputs.clone());
                for (key, value) in outcome.context_updates {
                    state.context.insert(key, value);
                }
                state.step_history.push(StepRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    node_id: current.clone(),
                    kind: node.kind.to_string(),
                    status: StepStatus::Completed,
                    started_at: started_at.to_rfc3339(),
                    completed_at: completed_at.to_rfc3339(),
                    duration_ms,
                    input: Value::Object(inputs),
                    output: Value::Object(outcome.outputs),
                    token_count: outcome.token_count,
                    error: None,
                });
                self.bus.emit(
                    execution_id,
                    EventKind::StepComplete {
                        node_id: current.clone(),
                        node_kind: node.kind.to_string(),
                        duration_ms,
                    },
                );

                match outcome.next {
                    NextSelector::Suspend { question_id, .. } => {
                        state.pending_question = Some(question_id);
                        state.transition(ExecutionStatus::WaitingUser);
                        self.checkpoint(&mut state).await?;
                        Ok(StepOutcome::Suspended)
                    }
                    NextSelector::Follow => match self.resolve_transition(&plan, &current, &state) {
                        Next::Node(next) => {
                            state.current_node_id = Some(next);
                            state.touch();
                            self.checkpoint(&mut state).await?;
                            Ok(StepOutcome::Advanced)
                        }
                        Next::End(end_id) => {
                            let status = end_id
                                .as_deref()
                                .and_then(|id| plan.target_status(id))
                                .map(str::to_string);
                            self.complete(&mut state, status).await.map(StepOutcome::Finished)
                        }
                    },
                }
            }
            Err(err) => {
                state.step_history.push(StepRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    node_id: current.clone(),
                    kind: node.kind.to_string(),
                    status: StepStatus::Failed,
                    started_at: started_at.to_rfc3339(),
                    completed_at: completed_at.to_rfc3339(),
                    duration_ms,
                    input: Value::Object(inputs),
                    output: Value::Null,
                    token_count: None,
                    error: Some(err.to_string()),
                });
                self.fail(&mut state, err, Some(&node)).await?;
                Ok(StepOutcome::Failed)
            }
        }
    }

    /// Step until the execution suspends, pauses, fails or reaches END.
    pub async fn run(&self, execution_id: &str) -> Result<StepOutcome> {
        loop {
            match self.step(execution_id).await? {
                StepOutcome::Advanced => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Answer the pending question and resume.
    ///
    /// Idempotent while suspended on the same question; answering after the
    /// execution advanced is a conflict.
    pub async fn submit_answer(
        &self,
        execution_id: &str,
        question_id: &str,
        value: Value,
    ) -> Result<()> {
        let mut state = self.load(execution_id).await?;

        if state.status == ExecutionStatus::WaitingUser
            && state.pending_question.as_deref() == Some(question_id)
        {
            state.answers.insert(question_id.to_string(), value);
            state.current_question_index += 1;
            state.pending_question = None;
            state.transition(ExecutionStatus::Running);
            self.bus.emit(execution_id, EventKind::WorkflowResume);
            self.checkpoint(&mut state).await?;
            return Ok(());
        }

        if state.answers.contains_key(question_id) {
            return Err(EngineError::Conflict(format!(
                "question '{question_id}' was already answered"
            )));
        }
        Err(EngineError::Conflict(format!(
            "execution is not waiting on question '{question_id}'"
        )))
    }

    /// Skip the pending question and resume.
    pub async fn skip_question(&self, execution_id: &str, question_id: &str) -> Result<()> {
        let mut state = self.load(execution_id).await?;

        if state.status == ExecutionStatus::WaitingUser
            && state.pending_question.as_deref() == Some(question_id)
        {
            if !state.skipped_questions.iter().any(|q| q == question_id) {
                state.skipped_questions.push(question_id.to_string());
            }
            state.current_question_index += 1;
            state.pending_question = None;
            state.transition(ExecutionStatus::Running);
            self.bus.emit(execution_id, EventKind::WorkflowResume);
            self.checkpoint(&mut state).await?;
            return Ok(());
        }
        Err(EngineError::Conflict(format!(
            "execution is not waiting on question '{question_id}'"
        )))
    }

    pub async fn pause(&self, execution_id: &str) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        match state.status {
            ExecutionStatus::Paused => Ok(()),
            ExecutionStatus::Running => {
                state.transition(ExecutionStatus::Paused);
                self.bus.emit(execution_id, EventKind::WorkflowPause);
                self.checkpoint(&mut state).await?;
                Ok(())
            }
            other => Err(EngineError::Conflict(format!(
                "cannot pause an execution in status '{other}'"
            ))),
        }
    }

    pub async fn resume(&self, execution_id: &str) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        match state.status {
            ExecutionStatus::Running => Ok(()),
            ExecutionStatus::Paused => {
                state.transition(ExecutionStatus::Running);
                self.bus.emit(execution_id, EventKind::WorkflowResume);
                self.checkpoint(&mut state).await?;
                Ok(())
            }
            other => Err(EngineError::Conflict(format!(
                "cannot resume an execution in status '{other}'"
            ))),
        }
    }

    /// Request cancellation. A running execution is flagged and fails at the
    /// next step boundary; a suspended or paused one fails immediately.
    /// In-flight executor calls are never interrupted.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        match state.status {
            ExecutionStatus::Completed | ExecutionStatus::Failed => Ok(()),
            ExecutionStatus::Running => {
                state.cancel_requested = true;
                state.touch();
                self.checkpoint(&mut state).await?;
                Ok(())
            }
            _ => {
                self.fail(&mut state, EngineError::Cancelled, None).await?;
                Ok(())
            }
        }
    }

    /// Reset the cursor to a node of a failed execution and resume.
    pub async fn retry_step(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        let plan = self.plan(execution_id)?;

        if state.status != ExecutionStatus::Failed {
            return Err(EngineError::Conflict(format!(
                "retry requires a failed execution, status is '{}'",
                state.status
            )));
        }
        if plan.node(node_id).is_none() && !plan.is_end(node_id) {
            return Err(EngineError::NotFound(format!(
                "node '{node_id}' is not part of the plan"
            )));
        }

        state.current_node_id = Some(node_id.to_string());
        state.retry_count += 1;
        state.last_error = None;
        state.cancel_requested = false;
        state.completed_at = None;
        state.transition(ExecutionStatus::Running);
        self.bus.emit(execution_id, EventKind::WorkflowResume);
        self.checkpoint(&mut state).await?;
        Ok(())
    }

    /// Mark stale `running` executions failed. Returns how many were swept.
    pub async fn sweep_stale(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| EngineError::Internal(e.to_string()))?;
        let stale = self.saver.stale_running(cutoff).await?;
        let count = stale.len();
        for mut state in stale {
            tracing::warn!(execution = %state.id, "sweeping stale execution");
            self.bus.register(&state.id, state.event_seq);
            self.fail(&mut state, EngineError::StaleExecution, None).await?;
        }
        Ok(count)
    }

    // ----- remote reconciliation ------------------------------------------

    /// Apply a container activity webhook.
    pub async fn apply_remote_activity(
        &self,
        execution_id: &str,
        node_id: &str,
        name: &str,
        data: Value,
    ) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        self.bus.emit(
            execution_id,
            EventKind::Activity {
                node_id: node_id.to_string(),
                name: name.to_string(),
                data,
            },
        );
        self.checkpoint(&mut state).await
    }

    /// Apply a container port-data webhook.
    pub async fn apply_remote_port_data(
        &self,
        execution_id: &str,
        node_id: &str,
        ports: Map<String, Value>,
    ) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        state.write_ports(node_id, ports);
        state.current_node_id = Some(node_id.to_string());
        self.checkpoint(&mut state).await
    }

    /// Apply a container completion webhook.
    pub async fn apply_remote_complete(
        &self,
        execution_id: &str,
        target_status: Option<String>,
    ) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        if state.status.is_terminal() {
            return Ok(());
        }
        self.complete(&mut state, target_status).await.map(|_| ())
    }

    /// Apply a container error webhook. A late signal against an already
    /// terminal execution is ignored.
    pub async fn apply_remote_error(
        &self,
        execution_id: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        let mut state = self.load(execution_id).await?;
        if state.status.is_terminal() {
            return Ok(());
        }
        state.last_error = Some(ExecutionError::new(kind, message));
        state.transition(ExecutionStatus::Failed);
        self.bus.emit(
            execution_id,
            EventKind::WorkflowError {
                error: message.to_string(),
                error_kind: kind.to_string(),
            },
        );
        self.checkpoint(&mut state).await
    }

    // ----- internals -------------------------------------------------------

    async fn load(&self, execution_id: &str) -> Result<ExecutionState> {
        self.saver
            .load(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution '{execution_id}'")))
    }

    fn plan(&self, execution_id: &str) -> Result<Arc<Plan>> {
        self.sessions
            .read()
            .get(execution_id)
            .map(|s| s.plan.clone())
            .ok_or_else(|| {
                EngineError::Conflict(format!(
                    "no plan attached for execution '{execution_id}'"
                ))
            })
    }

    fn env(&self, execution_id: &str) -> HashMap<String, String> {
        self.sessions
            .read()
            .get(execution_id)
            .map(|s| s.env.clone())
            .unwrap_or_default()
    }

    async fn checkpoint(&self, state: &mut ExecutionState) -> Result<()> {
        state.event_seq = self.bus.current_seq(&state.id);
        self.saver.save(state).await?;
        Ok(())
    }

    async fn complete(
        &self,
        state: &mut ExecutionState,
        target_status: Option<String>,
    ) -> Result<Option<String>> {
        state.completion_status = target_status.clone();
        state.current_node_id = None;
        state.transition(ExecutionStatus::Completed);
        self.bus.emit(
            &state.id,
            EventKind::WorkflowComplete {
                target_status: target_status.clone(),
            },
        );
        self.checkpoint(state).await?;
        self.sessions.write().remove(&state.id);
        tracing::info!(execution = %state.id, status = ?target_status, "execution completed");
        Ok(target_status)
    }

    async fn fail(
        &self,
        state: &mut ExecutionState,
        err: EngineError,
        node: Option<&foundry_graph::PlanNode>,
    ) -> Result<()> {
        state.last_error = Some(ExecutionError::new(err.kind(), err.to_string()));
        if let Some(node) = node {
            self.bus.emit(
                &state.id,
                EventKind::StepError {
                    node_id: node.id.clone(),
                    node_kind: node.kind.to_string(),
                    error: err.to_string(),
                    error_kind: err.kind().to_string(),
                },
            );
        }
        state.transition(ExecutionStatus::Failed);
        self.bus.emit(
            &state.id,
            EventKind::WorkflowError {
                error: err.to_string(),
                error_kind: err.kind().to_string(),
            },
        );
        self.checkpoint(state).await?;
        tracing::warn!(execution = %state.id, kind = err.kind(), "execution failed");
        Ok(())
    }

    fn resolve_transition(&self, plan: &Plan, node_id: &str, state: &ExecutionState) -> Next {
        let scope = build_scope(state, node_id, &Map::new());

        let spec = plan.transitions.get(node_id).cloned().unwrap_or_else(|| {
            let target = plan
                .adjacency
                .get(node_id)
                .and_then(|t| t.first())
                .cloned()
                .unwrap_or_else(|| END.to_string());
            TransitionSpec::Simple { target }
        });

        let target = match spec {
            TransitionSpec::Simple { target } => target,
            TransitionSpec::Conditional {
                expr,
                then_target,
                else_target,
            } => match Expr::parse(&expr) {
                Ok(parsed) => {
                    if truthy(&parsed.eval(&scope)) {
                        then_target
                    } else {
                        else_target
                    }
                }
                Err(e) => {
                    tracing::warn!(node = node_id, error = %e, "conditional transition failed; ending");
                    END.to_string()
                }
            },
            TransitionSpec::Switch {
                expr,
                cases,
                default,
            } => match Expr::parse(&expr) {
                Ok(parsed) => {
                    let value = foundry_graph::expr::stringify(&parsed.eval(&scope));
                    cases
                        .into_iter()
                        .find(|c| c.value == value)
                        .map(|c| c.target)
                        .unwrap_or(default)
                }
                Err(e) => {
                    tracing::warn!(node = node_id, error = %e, "switch transition failed; ending");
                    END.to_string()
                }
            },
            TransitionSpec::Function { source } => match Expr::parse(&source) {
                Ok(parsed) => match parsed.eval(&function_scope(state, node_id)) {
                    Value::String(s) => s,
                    other => {
                        if truthy(&other) {
                            tracing::warn!(node = node_id, "function transition returned non-string; ending");
                        }
                        END.to_string()
                    }
                },
                Err(e) => {
                    tracing::warn!(node = node_id, error = %e, "function transition failed; ending");
                    END.to_string()
                }
            },
        };

        if target == END {
            return Next::End(plan.end_targets.get(node_id).cloned());
        }
        if plan.is_end(&target) {
            return Next::End(Some(target));
        }
        Next::Node(target)
    }
}

/// Sandbox root for function transitions. The source receives only
/// `{currentNode, status, context}` — no answers, no flattened context keys.
fn function_scope(state: &ExecutionState, node_id: &str) -> Value {
    json!({
        "currentNode": node_id,
        "status": state.status,
        "context": Value::Object(state.context.clone()),
    })
}

/// Expression/template scope: user context and resolved inputs at the top
/// level, plus the structured views.
fn build_scope(state: &ExecutionState, node_id: &str, inputs: &Map<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in &state.context {
        root.insert(key.clone(), value.clone());
    }
    for (key, value) in inputs {
        root.insert(key.clone(), value.clone());
    }
    root.insert("context".to_string(), Value::Object(state.context.clone()));
    root.insert("answers".to_string(), Value::Object(state.answers.clone()));
    root.insert(
        "skippedQuestions".to_string(),
        json!(state.skipped_questions),
    );
    root.insert("currentNode".to_string(), json!(node_id));
    root.insert("status".to_string(), json!(state.status));
    Value::Object(root)
}
