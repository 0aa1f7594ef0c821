//! Per-issue automation lock rows
//!
//! The primary key on `(project_id, issue_id)` is the concurrency guard:
//! acquiring is a plain INSERT, and a conflict means another automation
//! already holds the issue. A TTL sweep reclaims locks leaked by crashed
//! executions.

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::AutomationLock;
use chrono::{Duration, Utc};

pub struct LockRepository;

impl LockRepository {
    /// Try to take the lock. Returns false when the issue is already held.
    pub async fn try_acquire(
        pool: &DatabasePool,
        project_id: &str,
        issue_id: &str,
        execution_id: &str,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO automation_locks (project_id, issue_id, execution_id, acquired_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(issue_id)
        .bind(execution_id)
        .bind(&now)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let classified: DatabaseError = err.into();
                if classified.is_constraint_violation() {
                    Ok(false)
                } else {
                    Err(classified)
                }
            }
        }
    }

    /// Point the lock at the execution that now owns it.
    pub async fn assign_execution(
        pool: &DatabasePool,
        project_id: &str,
        issue_id: &str,
        execution_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE automation_locks SET execution_id = ? WHERE project_id = ? AND issue_id = ?",
        )
        .bind(execution_id)
        .bind(project_id)
        .bind(issue_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn release(
        pool: &DatabasePool,
        project_id: &str,
        issue_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM automation_locks WHERE project_id = ? AND issue_id = ?")
            .bind(project_id)
            .bind(issue_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn get(
        pool: &DatabasePool,
        project_id: &str,
        issue_id: &str,
    ) -> Result<Option<AutomationLock>, DatabaseError> {
        Ok(sqlx::query_as::<_, AutomationLock>(
            "SELECT * FROM automation_locks WHERE project_id = ? AND issue_id = ?",
        )
        .bind(project_id)
        .bind(issue_id)
        .fetch_optional(pool)
        .await?)
    }

    /// Reclaim locks older than the TTL. Returns how many were deleted.
    pub async fn sweep_expired(pool: &DatabasePool, ttl: Duration) -> Result<u64, DatabaseError> {
        let cutoff = (Utc::now() - ttl).to_rfc3339();
        let result = sqlx::query("DELETE FROM automation_locks WHERE acquired_at < ?")
            .bind(&cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
