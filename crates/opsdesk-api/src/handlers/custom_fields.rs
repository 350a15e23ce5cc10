//! Custom field definition handlers (catalog CRUD only)

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use opsdesk_common::text::slugify;
use opsdesk_common::types::CustomFieldId;
use opsdesk_common::Error;
use opsdesk_core::guard::perms;
use opsdesk_storage::models::CustomFieldDefinition;
use opsdesk_storage::repository::UpsertCustomField;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct UpsertDefinitionRequest {
    pub entity_type: String,
    pub name: String,
    /// Derived from `name` when omitted
    pub field_key: Option<String>,
    pub field_type: String,
    #[serde(default = "empty_array")]
    pub options: serde_json::Value,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn empty_array() -> serde_json::Value {
    serde_json::json!([])
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDefinitionsQuery {
    pub entity_type: Option<String>,
}

fn to_input(input: UpsertDefinitionRequest) -> ApiResult<UpsertCustomField> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::InvalidInput("Field name is required".to_string()).into());
    }

    let field_key = match input.field_key.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(key) => slugify(key),
        None => slugify(&name),
    };
    if field_key.is_empty() {
        return Err(Error::InvalidInput("Cannot derive a field key".to_string()).into());
    }

    Ok(UpsertCustomField {
        entity_type: input.entity_type,
        name,
        field_key,
        field_type: input.field_type,
        options: input.options,
        required: input.required,
        sort_order: input.sort_order,
    })
}

/// `GET /api/asset-custom-fields/definitions`
pub async fn list_definitions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListDefinitionsQuery>,
) -> ApiResult<Json<Vec<CustomFieldDefinition>>> {
    ctx.permissions.require(None, perms::PORTAL_ACCESS)?;
    let items = state
        .custom_fields
        .list(query.entity_type.as_deref())
        .await?;
    Ok(Json(items))
}

/// `POST /api/asset-custom-fields/definitions`
pub async fn create_definition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<UpsertDefinitionRequest>,
) -> ApiResult<(StatusCode, Json<CustomFieldDefinition>)> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;
    let definition = state.custom_fields.create(to_input(input)?).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// `PUT /api/asset-custom-fields/definitions/{id}`
pub async fn update_definition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<CustomFieldId>,
    Json(input): Json<UpsertDefinitionRequest>,
) -> ApiResult<Json<CustomFieldDefinition>> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;
    let definition = state.custom_fields.update(id, to_input(input)?).await?;
    Ok(Json(definition))
}

/// `DELETE /api/asset-custom-fields/definitions/{id}`
pub async fn delete_definition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<CustomFieldId>,
) -> ApiResult<StatusCode> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;
    state.custom_fields.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
