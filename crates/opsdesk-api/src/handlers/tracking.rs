//! Email tracking endpoints (public)
//!
//! The pixel always serves the 1×1 GIF with no-cache headers, even for an
//! unknown tracking id: the response must not reveal whether the id
//! exists. Unknown ids log a structured warning and insert nothing.

use crate::auth::{client_ip, AppState, AuthContext};
use crate::error::ApiResult;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use opsdesk_common::Error;
use opsdesk_core::guard::perms;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 1×1 transparent GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub tid: String,
    pub url: String,
}

fn pixel_response() -> Response {
    let mut response = (StatusCode::OK, PIXEL_GIF).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// `GET /api/email-tracking/pixel/{id}.gif`
pub async fn pixel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request,
) -> Response {
    let raw = id.strip_suffix(".gif").unwrap_or(&id);
    let ip = client_ip(&request);
    let user_agent = header_str(request.headers(), header::USER_AGENT);
    let referer = header_str(request.headers(), header::REFERER);

    match Uuid::parse_str(raw) {
        Ok(tracking_id) => match state.tracking.get_send(tracking_id).await {
            Ok(Some(_)) => {
                if let Err(e) = state
                    .tracking
                    .record_event(
                        tracking_id,
                        "open",
                        None,
                        ip.as_deref(),
                        user_agent.as_deref(),
                        referer.as_deref(),
                    )
                    .await
                {
                    warn!(%tracking_id, "Failed to record open event: {}", e);
                }
            }
            Ok(None) => {
                warn!(tracking_id = raw, "Pixel hit for unknown tracking id");
            }
            Err(e) => {
                warn!(tracking_id = raw, "Tracking lookup failed: {}", e);
            }
        },
        Err(_) => {
            warn!(tracking_id = raw, "Pixel hit with malformed tracking id");
        }
    }

    pixel_response()
}

/// `GET /api/email-tracking/click?tid=...&url=...`: records the click and
/// 302s to the target. Only http(s) targets are redirected.
pub async fn click(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClickQuery>,
    request: Request,
) -> ApiResult<Response> {
    if !query.url.starts_with("http://") && !query.url.starts_with("https://") {
        return Err(Error::InvalidInput("Redirect target must be http(s)".to_string()).into());
    }

    let ip = client_ip(&request);
    let user_agent = header_str(request.headers(), header::USER_AGENT);
    let referer = header_str(request.headers(), header::REFERER);

    match Uuid::parse_str(&query.tid) {
        Ok(tracking_id) => match state.tracking.get_send(tracking_id).await {
            Ok(Some(_)) => {
                if let Err(e) = state
                    .tracking
                    .record_event(
                        tracking_id,
                        "click",
                        Some(&query.url),
                        ip.as_deref(),
                        user_agent.as_deref(),
                        referer.as_deref(),
                    )
                    .await
                {
                    warn!(%tracking_id, "Failed to record click event: {}", e);
                }
            }
            Ok(None) => warn!(tracking_id = %query.tid, "Click for unknown tracking id"),
            Err(e) => warn!(tracking_id = %query.tid, "Tracking lookup failed: {}", e),
        },
        Err(_) => warn!(tracking_id = %query.tid, "Click with malformed tracking id"),
    }

    let location = HeaderValue::from_str(&query.url)
        .map_err(|_| Error::InvalidInput("Redirect target is not a valid header".to_string()))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// `GET /api/email-tracking/sends/{id}/events`: operator surface for
/// open/click history on one tracked send
pub async fn list_send_events(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.permissions.require(None, perms::SETTINGS_MANAGE)?;

    let send = state
        .tracking
        .get_send(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Tracked send {} not found", id)))?;
    let events = state.tracking.list_events(id).await?;

    Ok(Json(json!({
        "send": send,
        "events": events,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_bytes_are_a_gif() {
        assert_eq!(&PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(PIXEL_GIF.len(), 43);
        assert_eq!(*PIXEL_GIF.last().unwrap(), 0x3B);
    }

    #[test]
    fn test_pixel_response_headers() {
        let response = pixel_response();
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/gif");
        assert!(headers
            .get(header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("no-cache"));
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
    }
}
