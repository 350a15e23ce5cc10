//! Automation rule handlers

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::double_option;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use opsdesk_common::types::{EventType, RuleId, RuleKind};
use opsdesk_common::Error;
use opsdesk_core::automation::{next_run, ScheduleSpec};
use opsdesk_core::guard::perms;
use opsdesk_storage::models::{AutomationRule, AutomationRun};
use opsdesk_storage::repository::{CreateRule, RulePatch};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for creating a rule
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub kind: String,
    pub cadence: Option<String>,
    pub cron_expression: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_once: bool,
    pub trigger_event: Option<String>,
    #[serde(default = "empty_object")]
    pub trigger_filters: serde_json::Value,
    pub action_module: String,
    #[serde(default = "empty_object")]
    pub action_payload: serde_json::Value,
    #[serde(default = "default_status")]
    pub status: String,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn default_status() -> String {
    "active".to_string()
}

/// Sparse rule patch
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub cadence: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub cron_expression: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_time: Option<Option<DateTime<Utc>>>,
    pub run_once: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub trigger_event: Option<Option<String>>,
    pub trigger_filters: Option<serde_json::Value>,
    pub action_module: Option<String>,
    pub action_payload: Option<serde_json::Value>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_runs_limit")]
    pub limit: i64,
}

fn default_runs_limit() -> i64 {
    50
}

fn validate_module(state: &AppState, module: &str) -> ApiResult<()> {
    if state.modules.names().contains(&module) {
        return Ok(());
    }
    Err(Error::InvalidInput(format!(
        "Unknown action module '{}' (available: {})",
        module,
        state.modules.names().join(", ")
    ))
    .into())
}

fn validate_trigger_event(event: &str) -> ApiResult<()> {
    if EventType::parse(event).is_none() {
        return Err(Error::InvalidInput(format!("Unknown trigger event '{}'", event)).into());
    }
    Ok(())
}

/// `GET /api/automation/rules`
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<AutomationRule>>> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;
    Ok(Json(state.automation.list().await?))
}

/// `POST /api/automation/rules`
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<AutomationRule>)> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;

    let kind = RuleKind::parse(&input.kind)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown rule kind '{}'", input.kind)))?;
    validate_module(&state, &input.action_module)?;

    let next_run_at = match kind {
        RuleKind::Scheduled => {
            let spec = ScheduleSpec {
                cadence: input.cadence.as_deref(),
                cron_expression: input.cron_expression.as_deref(),
                scheduled_time: input.scheduled_time,
                run_once: input.run_once,
            };
            // Also validates the schedule inputs up front
            next_run(&spec, Utc::now())?
        }
        RuleKind::Event => {
            let event = input.trigger_event.as_deref().ok_or_else(|| {
                Error::InvalidInput("An event rule needs a trigger_event".to_string())
            })?;
            validate_trigger_event(event)?;
            None
        }
    };

    let rule = state
        .automation
        .create(CreateRule {
            name: input.name,
            kind: kind.as_str().to_string(),
            cadence: input.cadence,
            cron_expression: input.cron_expression,
            scheduled_time: input.scheduled_time,
            run_once: input.run_once,
            trigger_event: input.trigger_event,
            trigger_filters: input.trigger_filters,
            action_module: input.action_module,
            action_payload: input.action_payload,
            status: input.status,
            next_run_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// `GET /api/automation/rules/{id}`
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<RuleId>,
) -> ApiResult<Json<AutomationRule>> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;
    let rule = state
        .automation
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Rule {} not found", id)))?;
    Ok(Json(rule))
}

/// `PATCH /api/automation/rules/{id}`: also the enable/disable surface
/// via the `status` field. Deactivation stops future fires but does not
/// cancel an in-flight run.
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<RuleId>,
    Json(input): Json<UpdateRuleRequest>,
) -> ApiResult<Json<AutomationRule>> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;

    let existing = state
        .automation
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Rule {} not found", id)))?;

    if let Some(module) = &input.action_module {
        validate_module(&state, module)?;
    }
    if let Some(Some(event)) = &input.trigger_event {
        validate_trigger_event(event)?;
    }
    if let Some(status) = &input.status {
        if status != "active" && status != "inactive" {
            return Err(Error::InvalidInput(format!("Unknown rule status '{}'", status)).into());
        }
    }

    // Recompute the timer when schedule inputs change or the rule comes
    // back to life
    let schedule_changed = input.cadence.is_some()
        || input.cron_expression.is_some()
        || input.scheduled_time.is_some()
        || input.run_once.is_some()
        || input.status.as_deref() == Some("active");

    let next_run_at = if existing.kind == "scheduled" && schedule_changed {
        let spec = ScheduleSpec {
            cadence: input
                .cadence
                .as_ref()
                .map(|v| v.as_deref())
                .unwrap_or(existing.cadence.as_deref()),
            cron_expression: input
                .cron_expression
                .as_ref()
                .map(|v| v.as_deref())
                .unwrap_or(existing.cron_expression.as_deref()),
            scheduled_time: input
                .scheduled_time
                .unwrap_or(existing.scheduled_time),
            run_once: input.run_once.unwrap_or(existing.run_once),
        };
        Some(next_run(&spec, Utc::now())?)
    } else {
        None
    };

    let rule = state
        .automation
        .update(
            id,
            &RulePatch {
                name: input.name,
                cadence: input.cadence,
                cron_expression: input.cron_expression,
                scheduled_time: input.scheduled_time,
                run_once: input.run_once,
                trigger_event: input.trigger_event,
                trigger_filters: input.trigger_filters,
                action_module: input.action_module,
                action_payload: input.action_payload,
                status: input.status,
                next_run_at,
            },
        )
        .await?;

    Ok(Json(rule))
}

/// `DELETE /api/automation/rules/{id}`
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<RuleId>,
) -> ApiResult<StatusCode> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;
    state.automation.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/automation/rules/{id}/runs`
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<RuleId>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<AutomationRun>>> {
    ctx.permissions.require(None, perms::AUTOMATION_MANAGE)?;

    state
        .automation
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Rule {} not found", id)))?;

    let runs = state
        .automation
        .list_runs(id, query.limit.clamp(1, 200))
        .await?;
    Ok(Json(runs))
}
