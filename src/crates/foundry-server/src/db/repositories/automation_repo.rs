//! Automation repository (rules + nested transitions)

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::{Automation, AutomationRow, AutomationTransition, TransitionRow};
use chrono::Utc;
use uuid::Uuid;

pub struct AutomationRepository;

impl AutomationRepository {
    pub async fn create(pool: &DatabasePool, automation: &Automation) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO automations (id, project_id, name, trigger_kind, trigger_status,
                 button_label, workflow_id, enabled, priority, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&automation.id)
        .bind(&automation.project_id)
        .bind(&automation.name)
        .bind(automation.trigger_kind.as_str())
        .bind(&automation.trigger_status)
        .bind(&automation.button_label)
        .bind(&automation.workflow_id)
        .bind(automation.enabled as i64)
        .bind(automation.priority)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        Self::replace_transitions(pool, &automation.id, &automation.transitions).await?;
        Ok(())
    }

    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Automation>, DatabaseError> {
        let Some(row) = sqlx::query_as::<_, AutomationRow>("SELECT * FROM automations WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };
        let transitions = Self::transitions_of(pool, id).await?;
        Ok(Some(row.into_automation(transitions)?))
    }

    pub async fn list(pool: &DatabasePool, project_id: &str) -> Result<Vec<Automation>, DatabaseError> {
        let rows = sqlx::query_as::<_, AutomationRow>(
            "SELECT * FROM automations WHERE project_id = ? ORDER BY priority ASC, created_at ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await?;

        let mut automations = Vec::with_capacity(rows.len());
        for row in rows {
            let transitions = Self::transitions_of(pool, &row.id).await?;
            automations.push(row.into_automation(transitions)?);
        }
        Ok(automations)
    }

    /// Enabled status-enter automations matching a status, priority order.
    pub async fn matching(
        pool: &DatabasePool,
        project_id: &str,
        status: &str,
    ) -> Result<Vec<Automation>, DatabaseError> {
        let rows = sqlx::query_as::<_, AutomationRow>(
            "SELECT * FROM automations
             WHERE project_id = ? AND enabled = 1
               AND trigger_kind = 'status_enter' AND trigger_status = ?
             ORDER BY priority ASC, created_at ASC",
        )
        .bind(project_id)
        .bind(status)
        .fetch_all(pool)
        .await?;

        let mut automations = Vec::with_capacity(rows.len());
        for row in rows {
            let transitions = Self::transitions_of(pool, &row.id).await?;
            automations.push(row.into_automation(transitions)?);
        }
        Ok(automations)
    }

    pub async fn update(pool: &DatabasePool, automation: &Automation) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE automations
             SET name = ?, trigger_kind = ?, trigger_status = ?, button_label = ?,
                 workflow_id = ?, enabled = ?, priority = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&automation.name)
        .bind(automation.trigger_kind.as_str())
        .bind(&automation.trigger_status)
        .bind(&automation.button_label)
        .bind(&automation.workflow_id)
        .bind(automation.enabled as i64)
        .bind(automation.priority)
        .bind(&now)
        .bind(&automation.id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Self::replace_transitions(pool, &automation.id, &automation.transitions).await
    }

    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM automation_transitions WHERE automation_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        let result = sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn transitions_of(
        pool: &DatabasePool,
        automation_id: &str,
    ) -> Result<Vec<AutomationTransition>, DatabaseError> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            "SELECT * FROM automation_transitions WHERE automation_id = ? ORDER BY priority ASC",
        )
        .bind(automation_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(TransitionRow::into_transition).collect()
    }

    async fn replace_transitions(
        pool: &DatabasePool,
        automation_id: &str,
        transitions: &[AutomationTransition],
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM automation_transitions WHERE automation_id = ?")
            .bind(automation_id)
            .execute(pool)
            .await?;
        for transition in transitions {
            let id = if transition.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                transition.id.clone()
            };
            sqlx::query(
                "INSERT INTO automation_transitions
                     (id, automation_id, condition, custom_expression, next_status, priority)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(automation_id)
            .bind(transition.condition.as_str())
            .bind(&transition.custom_expression)
            .bind(&transition.next_status)
            .bind(transition.priority)
            .execute(pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::DatabaseConnection;
    use crate::db::models::{TransitionCondition, TriggerKind};

    async fn setup() -> DatabaseConnection {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.init_schema().await.unwrap();
        db
    }

    fn sample(id: &str, priority: i64, status: &str) -> Automation {
        Automation {
            id: id.to_string(),
            project_id: "proj-1".into(),
            name: format!("auto-{id}"),
            trigger_kind: TriggerKind::StatusEnter,
            trigger_status: Some(status.to_string()),
            button_label: None,
            workflow_id: "wf-1".into(),
            enabled: true,
            priority,
            transitions: vec![AutomationTransition {
                id: String::new(),
                condition: TransitionCondition::Success,
                custom_expression: None,
                next_status: "Review".into(),
                priority: 0,
            }],
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_with_transitions() {
        let db = setup().await;
        let pool = db.pool();
        AutomationRepository::create(pool, &sample("a1", 0, "InProgress")).await.unwrap();

        let fetched = AutomationRepository::get_by_id(pool, "a1").await.unwrap().unwrap();
        assert_eq!(fetched.trigger_status.as_deref(), Some("InProgress"));
        assert_eq!(fetched.transitions.len(), 1);
        assert_eq!(fetched.transitions[0].next_status, "Review");
    }

    #[tokio::test]
    async fn test_matching_respects_status_and_priority() {
        let db = setup().await;
        let pool = db.pool();
        AutomationRepository::create(pool, &sample("low", 10, "InProgress")).await.unwrap();
        AutomationRepository::create(pool, &sample("high", 1, "InProgress")).await.unwrap();
        AutomationRepository::create(pool, &sample("other", 0, "Done")).await.unwrap();

        let matched = AutomationRepository::matching(pool, "proj-1", "InProgress").await.unwrap();
        let ids: Vec<&str> = matched.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_disabled_automations_do_not_match() {
        let db = setup().await;
        let pool = db.pool();
        let mut automation = sample("a1", 0, "InProgress");
        automation.enabled = false;
        AutomationRepository::create(pool, &automation).await.unwrap();

        let matched = AutomationRepository::matching(pool, "proj-1", "InProgress").await.unwrap();
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_transitions() {
        let db = setup().await;
        let pool = db.pool();
        AutomationRepository::create(pool, &sample("a1", 0, "InProgress")).await.unwrap();

        let mut automation = AutomationRepository::get_by_id(pool, "a1").await.unwrap().unwrap();
        automation.transitions = vec![AutomationTransition {
            id: String::new(),
            condition: TransitionCondition::Failure,
            custom_expression: None,
            next_status: "Blocked".into(),
            priority: 0,
        }];
        AutomationRepository::update(pool, &automation).await.unwrap();

        let fetched = AutomationRepository::get_by_id(pool, "a1").await.unwrap().unwrap();
        assert_eq!(fetched.transitions.len(), 1);
        assert_eq!(fetched.transitions[0].condition, TransitionCondition::Failure);
    }
}
