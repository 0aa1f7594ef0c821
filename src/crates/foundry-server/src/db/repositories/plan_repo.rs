//! Materialised plans for remote executions
//!
//! The compiled plan JSON is persisted per execution; the `planRef` handed
//! to a container is the execution id, and the container fetches the plan
//! back through the API.

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use chrono::Utc;
use foundry_graph::Plan;

pub struct PlanRepository;

impl PlanRepository {
    pub async fn upsert(
        pool: &DatabasePool,
        execution_id: &str,
        plan: &Plan,
    ) -> Result<(), DatabaseError> {
        let blob = serde_json::to_string(plan).map_err(|e| DatabaseError::Encoding(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO plans (execution_id, plan, created_at) VALUES (?, ?, ?)
             ON CONFLICT(execution_id) DO UPDATE SET plan = excluded.plan",
        )
        .bind(execution_id)
        .bind(&blob)
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &DatabasePool, execution_id: &str) -> Result<Option<Plan>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT plan FROM plans WHERE execution_id = ?")
                .bind(execution_id)
                .fetch_optional(pool)
                .await?;
        match row {
            Some((blob,)) => Ok(Some(
                serde_json::from_str(&blob).map_err(|e| DatabaseError::Encoding(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn delete(pool: &DatabasePool, execution_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM plans WHERE execution_id = ?")
            .bind(execution_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::DatabaseConnection;
    use std::collections::HashMap;

    fn plan() -> Plan {
        Plan {
            workflow_id: "wf".into(),
            project_id: "proj".into(),
            executable: vec![],
            adjacency: HashMap::new(),
            port_mappings: HashMap::new(),
            transitions: HashMap::new(),
            end_mappings: HashMap::new(),
            end_targets: HashMap::new(),
            initial_port_data: HashMap::new(),
            entry: None,
            docker_image: Some("runner:1".into()),
        }
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.init_schema().await.unwrap();
        let pool = db.pool();

        PlanRepository::upsert(pool, "exec-1", &plan()).await.unwrap();
        let loaded = PlanRepository::get(pool, "exec-1").await.unwrap().unwrap();
        assert_eq!(loaded.docker_image.as_deref(), Some("runner:1"));

        PlanRepository::delete(pool, "exec-1").await.unwrap();
        assert!(PlanRepository::get(pool, "exec-1").await.unwrap().is_none());
    }
}
