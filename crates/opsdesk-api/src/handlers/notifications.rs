//! Notification feed, catalog, and preference handlers

use crate::auth::{AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use opsdesk_common::types::NotificationId;
use opsdesk_common::Error;
use opsdesk_core::guard::perms;
use opsdesk_storage::models::{Notification, NotificationEventSetting, NotificationPreference};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    pub limit: i64,
}

fn default_feed_limit() -> i64 {
    50
}

/// Catalog entry upsert body
#[derive(Debug, Deserialize)]
pub struct UpsertSettingRequest {
    pub display_name: String,
    pub description: Option<String>,
    pub message_template: String,
    #[serde(default = "default_true")]
    pub user_visible: bool,
    #[serde(default)]
    pub broadcast: bool,
    #[serde(default = "default_true")]
    pub allow_in_app: bool,
    #[serde(default = "default_true")]
    pub allow_email: bool,
    #[serde(default)]
    pub allow_sms: bool,
    #[serde(default = "default_true")]
    pub default_in_app: bool,
    #[serde(default)]
    pub default_email: bool,
    #[serde(default)]
    pub default_sms: bool,
    #[serde(default = "empty_array")]
    pub module_actions: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn empty_array() -> serde_json::Value {
    serde_json::json!([])
}

/// Per-channel preference body
#[derive(Debug, Deserialize)]
pub struct SetPreferenceRequest {
    pub in_app: bool,
    pub email: bool,
    pub sms: bool,
}

/// `GET /api/notifications`: own rows plus broadcasts, newest first
pub async fn list_feed(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let items = state
        .notifications
        .list_for_user(ctx.user.id, query.limit.clamp(1, 200))
        .await?;
    Ok(Json(items))
}

/// `POST /api/notifications/{id}/read`
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<NotificationId>,
) -> ApiResult<StatusCode> {
    state.notifications.mark_read(id, ctx.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/notification-settings`: operators see the full catalog,
/// everyone else only the user-visible entries
pub async fn list_settings(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<NotificationEventSetting>>> {
    let mut settings = state.notifications.list_settings().await?;
    if !ctx.permissions.has_any(perms::SETTINGS_MANAGE) {
        settings.retain(|s| s.user_visible);
    }
    Ok(Json(settings))
}

/// `PUT /api/notification-settings/{event_type}`
pub async fn upsert_setting(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(event_type): Path<String>,
    Json(input): Json<UpsertSettingRequest>,
) -> ApiResult<Json<NotificationEventSetting>> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;

    let setting = NotificationEventSetting {
        event_type: event_type.clone(),
        display_name: input.display_name,
        description: input.description,
        message_template: input.message_template,
        user_visible: input.user_visible,
        broadcast: input.broadcast,
        allow_in_app: input.allow_in_app,
        allow_email: input.allow_email,
        allow_sms: input.allow_sms,
        default_in_app: input.default_in_app,
        default_email: input.default_email,
        default_sms: input.default_sms,
        module_actions: input.module_actions,
    };

    state.notifications.upsert_setting(&setting).await?;
    Ok(Json(setting))
}

/// `GET /api/notification-preferences`: the caller's stored rows;
/// event types without a row follow the catalog defaults
pub async fn list_preferences(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<NotificationPreference>>> {
    let prefs = state
        .notifications
        .list_preferences_for_user(ctx.user.id)
        .await?;
    Ok(Json(prefs))
}

/// `PUT /api/notification-preferences/{event_type}`
pub async fn set_preference(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(event_type): Path<String>,
    Json(input): Json<SetPreferenceRequest>,
) -> ApiResult<Json<NotificationPreference>> {
    // The catalog entry must exist; preferences reference it
    state
        .notifications
        .get_setting(&event_type)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Unknown event type '{}'", event_type)))?;

    let pref = NotificationPreference {
        user_id: ctx.user.id,
        event_type,
        in_app: input.in_app,
        email: input.email,
        sms: input.sms,
    };

    state.notifications.set_preference(&pref).await?;
    Ok(Json(pref))
}
