//! Company (tenant) handlers

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use opsdesk_common::text::slugify;
use opsdesk_common::Error;
use opsdesk_core::guard::perms;
use opsdesk_storage::models::Company;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    /// Derived from `name` when omitted
    pub slug: Option<String>,
}

/// `GET /api/companies`: operators see every tenant, members only their
/// own
pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Company>>> {
    let mut companies = state.companies.list().await?;

    if !ctx.permissions.has_any(perms::SETTINGS_MANAGE) {
        let visible = ctx
            .permissions
            .companies_with(perms::PORTAL_ACCESS)
            .unwrap_or_default();
        companies.retain(|c| visible.contains(&c.id));
    }

    Ok(Json(companies))
}

/// `POST /api/companies`
pub async fn create_company(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<CreateCompanyRequest>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;

    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::InvalidInput("Company name is required".to_string()).into());
    }

    let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => slugify(raw),
        None => slugify(&name),
    };
    if slug.is_empty() {
        return Err(Error::InvalidInput("Cannot derive a company slug".to_string()).into());
    }

    let company = state.companies.create(&name, &slug).await?;
    Ok((StatusCode::CREATED, Json(company)))
}
