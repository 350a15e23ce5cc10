//! Automation rule and run repository

use crate::db::DatabasePool;
use crate::models::{AutomationRule, AutomationRun};
use crate::repository::map_write_err;
use chrono::{DateTime, Utc};
use opsdesk_common::types::{RuleId, RunId};
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// Input for creating a rule
#[derive(Debug, Clone)]
pub struct CreateRule {
    pub name: String,
    pub kind: String,
    pub cadence: Option<String>,
    pub cron_expression: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub run_once: bool,
    pub trigger_event: Option<String>,
    pub trigger_filters: serde_json::Value,
    pub action_module: String,
    pub action_payload: serde_json::Value,
    pub status: String,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Sparse rule patch
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub name: Option<String>,
    pub cadence: Option<Option<String>>,
    pub cron_expression: Option<Option<String>>,
    pub scheduled_time: Option<Option<DateTime<Utc>>>,
    pub run_once: Option<bool>,
    pub trigger_event: Option<Option<String>>,
    pub trigger_filters: Option<serde_json::Value>,
    pub action_module: Option<String>,
    pub action_payload: Option<serde_json::Value>,
    pub status: Option<String>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
}

/// A completed run to record
#[derive(Debug, Clone)]
pub struct NewRun {
    pub rule_id: RuleId,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Automation repository
#[derive(Clone)]
pub struct AutomationRepository {
    pool: DatabasePool,
}

impl AutomationRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a rule
    pub async fn create(&self, input: CreateRule) -> Result<AutomationRule> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO automation_rules (
                id, name, kind, cadence, cron_expression, scheduled_time, run_once,
                trigger_event, trigger_filters, action_module, action_payload,
                status, next_run_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW()
            )
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.kind)
        .bind(&input.cadence)
        .bind(&input.cron_expression)
        .bind(input.scheduled_time)
        .bind(input.run_once)
        .bind(&input.trigger_event)
        .bind(&input.trigger_filters)
        .bind(&input.action_module)
        .bind(&input.action_payload)
        .bind(&input.status)
        .bind(input.next_run_at)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created rule".to_string()))
    }

    /// Get a rule by ID
    pub async fn get(&self, id: RuleId) -> Result<Option<AutomationRule>> {
        sqlx::query_as::<_, AutomationRule>("SELECT * FROM automation_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// List all rules, newest first
    pub async fn list(&self) -> Result<Vec<AutomationRule>> {
        sqlx::query_as::<_, AutomationRule>(
            "SELECT * FROM automation_rules ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Active event-bound rules for one event type
    pub async fn list_event_rules(&self, event_type: &str) -> Result<Vec<AutomationRule>> {
        sqlx::query_as::<_, AutomationRule>(
            r#"
            SELECT * FROM automation_rules
            WHERE kind = 'event' AND status = 'active' AND trigger_event = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_type)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Active scheduled rules (for startup recompute)
    pub async fn list_active_scheduled(&self) -> Result<Vec<AutomationRule>> {
        sqlx::query_as::<_, AutomationRule>(
            "SELECT * FROM automation_rules WHERE kind = 'scheduled' AND status = 'active'",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Active scheduled rules whose next run is due
    pub async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<AutomationRule>> {
        sqlx::query_as::<_, AutomationRule>(
            r#"
            SELECT * FROM automation_rules
            WHERE kind = 'scheduled' AND status = 'active'
              AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Apply a sparse patch
    pub async fn update(&self, id: RuleId, patch: &RulePatch) -> Result<AutomationRule> {
        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut idx = 2;

        macro_rules! push_set {
            ($field:expr, $column:literal) => {
                if $field.is_some() {
                    sets.push(format!(concat!($column, " = ${}"), idx));
                    idx += 1;
                }
            };
        }

        push_set!(patch.name, "name");
        push_set!(patch.cadence, "cadence");
        push_set!(patch.cron_expression, "cron_expression");
        push_set!(patch.scheduled_time, "scheduled_time");
        push_set!(patch.run_once, "run_once");
        push_set!(patch.trigger_event, "trigger_event");
        push_set!(patch.trigger_filters, "trigger_filters");
        push_set!(patch.action_module, "action_module");
        push_set!(patch.action_payload, "action_payload");
        push_set!(patch.status, "status");
        push_set!(patch.next_run_at, "next_run_at");

        let query = format!("UPDATE automation_rules SET {} WHERE id = $1", sets.join(", "));
        let mut q = sqlx::query(&query).bind(id);

        if let Some(v) = &patch.name {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.cadence {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.cron_expression {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.scheduled_time {
            q = q.bind(*v);
        }
        if let Some(v) = patch.run_once {
            q = q.bind(v);
        }
        if let Some(v) = &patch.trigger_event {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.trigger_filters {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.action_module {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.action_payload {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.status {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.next_run_at {
            q = q.bind(*v);
        }

        let result = q.execute(self.pool.pool()).await.map_err(map_write_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Rule {} not found", id)));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Rule {} not found", id)))
    }

    /// Delete a rule (runs cascade)
    pub async fn delete(&self, id: RuleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM automation_rules WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Rule {} not found", id)));
        }
        Ok(())
    }

    /// Record a finished run and update the rule's bookkeeping columns
    pub async fn record_run(
        &self,
        run: NewRun,
        next_run_at: Option<DateTime<Utc>>,
        deactivate: bool,
    ) -> Result<RunId> {
        let id = Uuid::now_v7();
        let duration_ms = (run.finished_at - run.started_at).num_milliseconds();

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO automation_runs (
                id, rule_id, status, started_at, finished_at, duration_ms,
                result_payload, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(run.rule_id)
        .bind(&run.status)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(duration_ms)
        .bind(&run.result_payload)
        .bind(&run.error_message)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE automation_rules
            SET last_run_at = $2,
                next_run_at = $3,
                last_error = $4,
                status = CASE WHEN $5 THEN 'inactive' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run.rule_id)
        .bind(run.finished_at)
        .bind(next_run_at)
        .bind(&run.error_message)
        .bind(deactivate)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(id)
    }

    /// List runs for a rule, newest first
    pub async fn list_runs(&self, rule_id: RuleId, limit: i64) -> Result<Vec<AutomationRun>> {
        sqlx::query_as::<_, AutomationRun>(
            r#"
            SELECT * FROM automation_runs
            WHERE rule_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(rule_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
