//! Session login/logout

use crate::auth::{client_ip, AppState, AuthContext, SESSION_COOKIE};
use crate::error::ApiResult;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use opsdesk_common::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response: the CSRF token accompanies every later mutation
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub csrf_token: String,
}

fn random_token() -> String {
    // Two v4 UUIDs give 256 bits of cookie-safe hex
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .ok()
        .and_then(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .ok()
        })
        .is_some()
}

/// `POST /api/auth/login`: public, behind the stricter login limiter
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let ip = client_ip(&request);
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Brute-force protection keys on the client address
    state
        .login_limiter
        .check(&format!("login:{}", ip.as_deref().unwrap_or("unknown")))?;

    let body = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|e| Error::InvalidInput(format!("Unreadable request body: {}", e)))?;
    let input: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidInput(format!("Invalid login body: {}", e)))?;

    let user = state
        .users
        .find_by_email(input.email.trim())
        .await?
        .filter(|u| u.active);

    let Some(user) = user.filter(|u| verify_password(&input.password, &u.password_hash)) else {
        warn!(email = %input.email, "Login failed");
        return Err(Error::Unauthorised("Invalid email or password".to_string()).into());
    };

    // Opportunistic cleanup; expired sessions also fail the lookup
    if let Err(e) = state.sessions.purge_expired().await {
        warn!("Session purge failed: {}", e);
    }

    let session_id = random_token();
    let csrf_token = random_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session.ttl_hours);

    state
        .sessions
        .create(
            &session_id,
            user.id,
            &csrf_token,
            ip.as_deref(),
            user_agent.as_deref(),
            expires_at,
        )
        .await?;

    info!(user = %user.id, "Session created");

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user_id: user.id,
            email: user.email,
            csrf_token,
        }),
    ))
}

/// `GET /api/auth/me`: session bootstrap for clients: the user record
/// and their memberships
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<serde_json::Value>> {
    let memberships = state.users.memberships_for_user(ctx.user.id).await?;

    Ok(Json(json!({
        "user": ctx.user,
        "is_super_admin": ctx.permissions.is_super_admin(),
        "memberships": memberships,
    })))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    jar: CookieJar,
) -> ApiResult<(StatusCode, CookieJar, Json<serde_json::Value>)> {
    if let Some(session_id) = &ctx.session_id {
        state.sessions.delete(session_id).await?;
    }

    Ok((
        StatusCode::OK,
        jar.remove(Cookie::from(SESSION_COOKIE)),
        Json(json!({ "status": "logged_out" })),
    ))
}
