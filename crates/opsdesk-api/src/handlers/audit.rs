//! Audit log read surface

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use opsdesk_core::guard::perms;
use opsdesk_storage::models::AuditLogEntry;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// `GET /api/audit-log`: filtered by entity when both parts are given
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;

    let limit = query.limit.clamp(1, 500);
    let entries = match (query.entity_type.as_deref(), query.entity_id.as_deref()) {
        (Some(entity_type), Some(entity_id)) => {
            state
                .audit
                .list_for_entity(entity_type, entity_id, limit)
                .await?
        }
        _ => state.audit.list_recent(limit).await?,
    };

    Ok(Json(entries))
}
