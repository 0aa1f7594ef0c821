//! Logical table layout
//!
//! Created idempotently at startup. The partial unique index on executions
//! is what enforces the single-active-execution invariant — it survives
//! process crashes where application-level locking would not.

use crate::db::DatabasePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        nodes TEXT NOT NULL,
        edges TEXT NOT NULL,
        initial_context TEXT NOT NULL,
        encrypted_env TEXT,
        docker_image TEXT,
        remote_execution INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY NOT NULL,
        workflow_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        status TEXT NOT NULL,
        current_node_id TEXT,
        context TEXT NOT NULL,
        step_history TEXT NOT NULL,
        started_at TEXT NOT NULL,
        last_activity_at TEXT NOT NULL,
        paused_at TEXT,
        completed_at TEXT,
        last_error TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        CHECK (status IN ('pending', 'running', 'paused', 'waiting_user', 'completed', 'failed'))
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_executions_single_active
        ON executions(workflow_id, project_id) WHERE status = 'running'",
    "CREATE INDEX IF NOT EXISTS idx_executions_workflow
        ON executions(workflow_id)",
    "CREATE TABLE IF NOT EXISTS plans (
        execution_id TEXT PRIMARY KEY NOT NULL,
        plan TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS automations (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        trigger_kind TEXT NOT NULL,
        trigger_status TEXT,
        button_label TEXT,
        workflow_id TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        priority INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (trigger_kind IN ('status_enter', 'manual'))
    )",
    "CREATE TABLE IF NOT EXISTS automation_transitions (
        id TEXT PRIMARY KEY NOT NULL,
        automation_id TEXT NOT NULL REFERENCES automations(id) ON DELETE CASCADE,
        condition TEXT NOT NULL,
        custom_expression TEXT,
        next_status TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        CHECK (condition IN ('success', 'failure', 'custom'))
    )",
    "CREATE TABLE IF NOT EXISTS automation_locks (
        project_id TEXT NOT NULL,
        issue_id TEXT NOT NULL,
        execution_id TEXT NOT NULL,
        acquired_at TEXT NOT NULL,
        PRIMARY KEY (project_id, issue_id)
    )",
];

/// Run every schema statement.
pub async fn init_schema(pool: &DatabasePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
