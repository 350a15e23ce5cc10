//! Health endpoints

use crate::auth::AppState;
use crate::error::ApiResult;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Liveness: the process is up
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: the database answers
pub async fn readiness(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.db_pool.health_check().await?;
    Ok(Json(json!({ "status": "ready" })))
}
