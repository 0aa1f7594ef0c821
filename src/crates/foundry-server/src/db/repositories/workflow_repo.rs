//! Workflow repository

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::WorkflowRow;
use chrono::Utc;
use uuid::Uuid;

pub struct WorkflowRepository;

impl WorkflowRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &DatabasePool,
        id: String,
        project_id: String,
        name: String,
        description: Option<String>,
        nodes: String,
        edges: String,
        initial_context: String,
        encrypted_env: Option<String>,
        docker_image: Option<String>,
        remote_execution: bool,
    ) -> Result<WorkflowRow, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query_as::<_, WorkflowRow>(
            "INSERT INTO workflows (id, project_id, name, description, nodes, edges,
                 initial_context, encrypted_env, docker_image, remote_execution,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&id)
        .bind(&project_id)
        .bind(&name)
        .bind(&description)
        .bind(&nodes)
        .bind(&edges)
        .bind(&initial_context)
        .bind(&encrypted_env)
        .bind(&docker_image)
        .bind(remote_execution as i64)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<WorkflowRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn list(pool: &DatabasePool, project_id: Option<&str>) -> Result<Vec<WorkflowRow>, DatabaseError> {
        let rows = match project_id {
            Some(project) => {
                sqlx::query_as::<_, WorkflowRow>(
                    "SELECT * FROM workflows WHERE project_id = ? ORDER BY created_at DESC",
                )
                .bind(project)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows ORDER BY created_at DESC")
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Update mutable fields; bumps `updated_at`.
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        pool: &DatabasePool,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        nodes: Option<String>,
        edges: Option<String>,
        initial_context: Option<String>,
        encrypted_env: Option<String>,
        docker_image: Option<String>,
        remote_execution: Option<bool>,
    ) -> Result<WorkflowRow, DatabaseError> {
        let existing = Self::get_by_id(pool, id).await?.ok_or(DatabaseError::NotFound)?;
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query_as::<_, WorkflowRow>(
            "UPDATE workflows
             SET name = ?, description = ?, nodes = ?, edges = ?, initial_context = ?,
                 encrypted_env = ?, docker_image = ?, remote_execution = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(name.unwrap_or(existing.name))
        .bind(description.or(existing.description))
        .bind(nodes.unwrap_or(existing.nodes))
        .bind(edges.unwrap_or(existing.edges))
        .bind(initial_context.unwrap_or(existing.initial_context))
        .bind(encrypted_env.or(existing.encrypted_env))
        .bind(docker_image.or(existing.docker_image))
        .bind(remote_execution.map(|r| r as i64).unwrap_or(existing.remote_execution))
        .bind(&now)
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Copy a workflow under a fresh id with a "(copy)" name suffix.
    pub async fn duplicate(pool: &DatabasePool, id: &str) -> Result<WorkflowRow, DatabaseError> {
        let existing = Self::get_by_id(pool, id).await?.ok_or(DatabaseError::NotFound)?;
        Self::create(
            pool,
            Uuid::new_v4().to_string(),
            existing.project_id,
            format!("{} (copy)", existing.name),
            existing.description,
            existing.nodes,
            existing.edges,
            existing.initial_context,
            existing.encrypted_env,
            existing.docker_image,
            existing.remote_execution != 0,
        )
        .await
    }

    /// Whether any execution still references this workflow.
    pub async fn has_executions(pool: &DatabasePool, id: &str) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM executions WHERE workflow_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(count.0 > 0)
    }
}
