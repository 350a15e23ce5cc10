//! API routes

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, rate_limit_middleware, AppState};
use crate::handlers::{
    audit, auth, automation, companies, custom_fields, health, mcp, notifications, statuses,
    tickets, tracking,
};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health routes (no auth, no rate limit)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness));

    // Public routes: login, email tracking, and the MCP adapter, which
    // carries its own shared-secret auth
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/email-tracking/pixel/:id", get(tracking::pixel))
        .route("/email-tracking/click", get(tracking::click))
        .route("/mcp/chatgpt/", get(mcp::endpoint).post(mcp::endpoint));

    let ticket_routes = Router::new()
        .route("/", get(tickets::list_tickets))
        .route("/", post(tickets::create_ticket))
        .route("/:id", get(tickets::get_ticket))
        .route("/:id", patch(tickets::update_ticket))
        .route("/:id/replies", get(tickets::list_replies))
        .route("/:id/replies", post(tickets::add_reply))
        .route("/:id/watchers", get(tickets::list_watchers))
        .route("/:id/watchers/:user_id", post(tickets::add_watcher))
        .route("/:id/watchers/:user_id", delete(tickets::remove_watcher));

    let automation_routes = Router::new()
        .route("/rules", get(automation::list_rules))
        .route("/rules", post(automation::create_rule))
        .route("/rules/:id", get(automation::get_rule))
        .route("/rules/:id", patch(automation::update_rule))
        .route("/rules/:id", delete(automation::delete_rule))
        .route("/rules/:id/runs", get(automation::list_runs));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_feed))
        .route("/:id/read", post(notifications::mark_read));

    let custom_field_routes = Router::new()
        .route("/definitions", get(custom_fields::list_definitions))
        .route("/definitions", post(custom_fields::create_definition))
        .route("/definitions/:id", put(custom_fields::update_definition))
        .route("/definitions/:id", delete(custom_fields::delete_definition));

    // Authenticated surface
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .nest("/tickets", ticket_routes)
        .route("/ticket-statuses", get(statuses::list_statuses))
        .route("/ticket-statuses", put(statuses::replace_statuses))
        .nest("/automation", automation_routes)
        .nest("/notifications", notification_routes)
        .route(
            "/notification-settings",
            get(notifications::list_settings),
        )
        .route(
            "/notification-settings/:event_type",
            put(notifications::upsert_setting),
        )
        .route(
            "/notification-preferences",
            get(notifications::list_preferences),
        )
        .route(
            "/notification-preferences/:event_type",
            put(notifications::set_preference),
        )
        .nest("/asset-custom-fields", custom_field_routes)
        .route("/companies", get(companies::list_companies))
        .route("/companies", post(companies::create_company))
        .route("/audit-log", get(audit::list_entries))
        .route(
            "/email-tracking/sends/:id/events",
            get(tracking::list_send_events),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
