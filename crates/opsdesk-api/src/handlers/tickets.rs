//! Ticket handlers
//!
//! Tenant scoping is enforced three times: the permission check at entry,
//! the company filter pushed into list queries, and the internal-reply
//! filter on responses.

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::double_option;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use opsdesk_common::types::{CompanyId, Page, Pagination, TicketId, UserId};
use opsdesk_common::Error;
use opsdesk_core::guard::perms;
use opsdesk_core::tickets::{NewTicket, TicketUpdate};
use opsdesk_storage::models::{Ticket, TicketReply};
use opsdesk_storage::repository::ListTicketsFilter;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub module_slug: Option<String>,
    pub external_provider: Option<String>,
    pub external_reference: Option<String>,
    pub company_id: Option<CompanyId>,
    pub requester_id: Option<UserId>,
    pub assigned_user_id: Option<UserId>,
}

/// Sparse patch body
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub module_slug: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_user_id: Option<Option<UserId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ai_summary: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ai_summary_status: Option<Option<String>>,
    pub ai_tags: Option<Vec<String>>,
}

/// Query filters for listing
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub company_id: Option<CompanyId>,
    pub module_slug: Option<String>,
    pub assigned_user_id: Option<UserId>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for a reply
#[derive(Debug, Deserialize)]
pub struct AddReplyRequest {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

fn require_view(ctx: &AuthContext, company_id: Option<CompanyId>) -> ApiResult<()> {
    if ctx.permissions.has(company_id, perms::PORTAL_ACCESS)
        || ctx.permissions.has(company_id, perms::TICKETS_MANAGE)
    {
        return Ok(());
    }
    Err(Error::Forbidden("No access to this ticket".to_string()).into())
}

fn is_technician(ctx: &AuthContext, company_id: Option<CompanyId>) -> bool {
    ctx.permissions.has(company_id, perms::HELPDESK_TECHNICIAN)
}

/// `POST /api/tickets`
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    require_view(&ctx, input.company_id)?;

    if let Some(company_id) = input.company_id {
        state
            .companies
            .get(company_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("Unknown company {}", company_id)))?;
    }

    let ticket = state
        .tickets
        .create(
            NewTicket {
                subject: input.subject,
                description: input.description,
                status: input.status,
                priority: input.priority,
                category: input.category,
                module_slug: input.module_slug,
                external_provider: input.external_provider,
                external_reference: input.external_reference,
                company_id: input.company_id,
                requester_id: input.requester_id.or(Some(ctx.user.id)),
                assigned_user_id: input.assigned_user_id,
            },
            Some(ctx.actor()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// `GET /api/tickets/{id}`
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;
    Ok(Json(ticket))
}

/// `PATCH /api/tickets/{id}`
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<TicketId>,
    Json(input): Json<UpdateTicketRequest>,
) -> ApiResult<Json<Ticket>> {
    let existing = state.tickets.get(id).await?;
    ctx.permissions
        .require(existing.company_id, perms::TICKETS_MANAGE)?;

    let ticket = state
        .tickets
        .update(
            id,
            TicketUpdate {
                subject: input.subject,
                description: input.description,
                status: input.status,
                priority: input.priority,
                category: input.category,
                module_slug: input.module_slug,
                assigned_user_id: input.assigned_user_id,
                ai_summary: input.ai_summary,
                ai_summary_status: input.ai_summary_status,
                ai_tags: input.ai_tags,
            },
            Some(ctx.actor()),
        )
        .await?;

    Ok(Json(ticket))
}

/// `GET /api/tickets`
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<Json<Page<Ticket>>> {
    // Non-super callers see only companies where they hold portal access
    let visible = ctx.permissions.companies_with(perms::PORTAL_ACCESS);

    let (company_id, visible_companies) = match (&visible, query.company_id) {
        (None, requested) => (requested, None),
        (Some(allowed), Some(requested)) => {
            if !allowed.contains(&requested) {
                return Err(Error::Forbidden("No access to this company".to_string()).into());
            }
            (Some(requested), None)
        }
        (Some(allowed), None) => (None, Some(allowed.clone())),
    };

    let filter = ListTicketsFilter {
        status: query.status,
        priority: query.priority,
        company_id,
        module_slug: query.module_slug,
        assigned_user_id: query.assigned_user_id,
        search: query.search,
        visible_companies,
    };

    let page = Pagination {
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    };

    let page = state.tickets.list(&filter, page).await?;
    Ok(Json(page))
}

/// `POST /api/tickets/{id}/replies`
pub async fn add_reply(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<TicketId>,
    Json(input): Json<AddReplyRequest>,
) -> ApiResult<(StatusCode, Json<TicketReply>)> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;

    // Internal notes are a technician affordance
    if input.is_internal && !is_technician(&ctx, ticket.company_id) {
        return Err(Error::Forbidden("Internal replies require technician access".to_string()).into());
    }

    let reply = state
        .tickets
        .add_reply(
            id,
            Some(ctx.user.id),
            &input.body,
            input.is_internal,
            Some(ctx.actor()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

/// `GET /api/tickets/{id}/replies`
pub async fn list_replies(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<Vec<TicketReply>>> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;

    let include_internal = is_technician(&ctx, ticket.company_id);
    let replies = state.tickets.list_replies(id, include_internal).await?;
    Ok(Json(replies))
}

/// `POST /api/tickets/{id}/watchers/{user_id}`: 201 even when already
/// watching (idempotent)
pub async fn add_watcher(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path((id, user_id)): Path<(TicketId, UserId)>,
) -> ApiResult<StatusCode> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;

    // Watching yourself is self-service; managing others needs authority
    if user_id != ctx.user.id {
        ctx.permissions
            .require(ticket.company_id, perms::TICKETS_MANAGE)?;
    }

    state
        .tickets
        .add_watcher(id, user_id, Some(ctx.actor()))
        .await?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /api/tickets/{id}/watchers/{user_id}`: 204 even when absent
pub async fn remove_watcher(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path((id, user_id)): Path<(TicketId, UserId)>,
) -> ApiResult<StatusCode> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;

    if user_id != ctx.user.id {
        ctx.permissions
            .require(ticket.company_id, perms::TICKETS_MANAGE)?;
    }

    state
        .tickets
        .remove_watcher(id, user_id, Some(ctx.actor()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/tickets/{id}/watchers`
pub async fn list_watchers(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<TicketId>,
) -> ApiResult<Json<serde_json::Value>> {
    let ticket = state.tickets.get(id).await?;
    require_view(&ctx, ticket.company_id)?;

    let watchers = state.tickets.list_watchers(id).await?;
    Ok(Json(json!({ "items": watchers })))
}
