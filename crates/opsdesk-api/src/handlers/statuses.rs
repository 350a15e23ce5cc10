//! Status catalog handlers

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::State;
use axum::{Extension, Json};
use opsdesk_core::guard::perms;
use opsdesk_core::status::IncomingStatus;
use opsdesk_storage::models::TicketStatus;
use serde::Deserialize;
use std::sync::Arc;

/// One incoming catalog row
#[derive(Debug, Deserialize)]
pub struct StatusDefinitionRequest {
    #[serde(default)]
    pub tech_status: String,
    pub tech_label: String,
    pub public_status: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub original_slug: Option<String>,
}

/// `GET /api/ticket-statuses`
pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TicketStatus>>> {
    ctx.permissions.require(None, perms::PORTAL_ACCESS)?;
    Ok(Json(state.statuses.list().await?))
}

/// `PUT /api/ticket-statuses`: atomic catalog replacement. Renames
/// rewrite referencing tickets; removing a referenced slug fails the whole
/// request with 409.
pub async fn replace_statuses(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<Vec<StatusDefinitionRequest>>,
) -> ApiResult<Json<Vec<TicketStatus>>> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;

    let incoming = input
        .into_iter()
        .map(|def| IncomingStatus {
            tech_status: def.tech_status,
            tech_label: def.tech_label,
            public_status: def.public_status,
            is_default: def.is_default,
            original_slug: def.original_slug,
        })
        .collect();

    state.statuses.replace(incoming).await?;
    Ok(Json(state.statuses.list().await?))
}
