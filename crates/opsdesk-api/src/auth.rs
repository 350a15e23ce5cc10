//! Authentication middleware and shared state
//!
//! Two kinds of principal: API keys (Bearer or X-API-Key header, verified
//! against a stored Argon2 or legacy SHA-256 hash via prefix lookup) and
//! session cookies. Session-backed mutations additionally require the
//! `X-CSRF-Token` header to match the session's stored token; API keys are
//! exempt, having no ambient browser credential. The sliding-window rate
//! limiter runs in front of authentication so unauthenticated floods are
//! cheap to refuse.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use opsdesk_common::{Config, Error};
use opsdesk_core::bus::Actor;
use opsdesk_core::guard::{PermissionGuard, ResolvedPermissions};
use opsdesk_core::modules::ModuleRegistry;
use opsdesk_core::rate_limit::RateLimiter;
use opsdesk_core::status::StatusEngine;
use opsdesk_core::tickets::TicketService;
use opsdesk_storage::models::User;
use opsdesk_storage::repository::{
    ApiKeyRepository, AuditRepository, AutomationRepository, CompanyRepository,
    CustomFieldRepository, NotificationRepository, SessionRepository, TrackingRepository,
    UserRepository,
};
use opsdesk_storage::DatabasePool;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "opsdesk_session";

/// Application state shared across handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub config: Config,
    pub tickets: TicketService,
    pub statuses: StatusEngine,
    pub guard: PermissionGuard,
    pub modules: Arc<ModuleRegistry>,
    pub users: UserRepository,
    pub sessions: SessionRepository,
    pub api_keys: ApiKeyRepository,
    pub companies: CompanyRepository,
    pub automation: AutomationRepository,
    pub notifications: NotificationRepository,
    pub custom_fields: CustomFieldRepository,
    pub tracking: TrackingRepository,
    pub audit: AuditRepository,
    pub limiter: Arc<RateLimiter>,
    pub login_limiter: Arc<RateLimiter>,
}

/// Authenticated principal attached to the request
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
    pub permissions: ResolvedPermissions,
    /// Set for API-key principals (audit attribution)
    pub api_key_id: Option<Uuid>,
    /// Set for session principals (logout)
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
}

impl AuthContext {
    /// Actor descriptor for bus events and audit entries
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: Some(self.user.id),
            api_key_id: self.api_key_id,
        }
    }
}

/// Extract a bearer or X-API-Key credential
fn extract_api_key(req: &Request) -> Option<String> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// SHA-256 hex digest of a secret
pub fn sha256_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against its stored hash. Argon2 hashes are the
/// norm; bare SHA-256 hex is accepted for keys provisioned out-of-band.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed)
                    .ok()
            })
            .is_some();
    }

    sha256_hex(api_key) == stored_hash
}

/// Best-effort client address: first X-Forwarded-For hop, else the socket
pub fn client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let trimmed = first.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

async fn resolve_api_key_principal(
    state: &AppState,
    api_key: &str,
) -> Result<(User, Uuid), Error> {
    if api_key.len() < 8 {
        return Err(Error::Unauthorised("Invalid API key".to_string()));
    }
    let prefix = &api_key[..8];

    let candidates = state.api_keys.find_by_prefix(prefix).await?;
    for candidate in candidates {
        if !verify_api_key(api_key, &candidate.key_hash) {
            continue;
        }
        if candidate.is_expired() {
            warn!(key = %candidate.id, "Expired API key presented");
            return Err(Error::Unauthorised("API key has expired".to_string()));
        }

        // Touch last_used_at without holding up the request
        let repo = state.api_keys.clone();
        let key_id = candidate.id;
        tokio::spawn(async move {
            if let Err(e) = repo.update_last_used(key_id).await {
                warn!("Failed to update API key last_used_at: {}", e);
            }
        });

        let user = state
            .users
            .get(candidate.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| Error::Unauthorised("API key user is inactive".to_string()))?;

        return Ok((user, candidate.id));
    }

    warn!(prefix, "API key verification failed");
    Err(Error::Unauthorised("Invalid API key".to_string()))
}

async fn resolve_session_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<(User, String, String)>, Error> {
    let jar = CookieJar::from_headers(headers);
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    let session = state
        .sessions
        .get(cookie.value())
        .await?
        .ok_or_else(|| Error::Unauthorised("Invalid session".to_string()))?;

    if session.is_expired() {
        return Err(Error::Unauthorised("Session has expired".to_string()));
    }

    let user = state
        .users
        .get(session.user_id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| Error::Unauthorised("Session user is inactive".to_string()))?;

    Ok(Some((user, session.id, session.csrf_token)))
}

/// Authentication middleware for the protected API surface
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, crate::ApiError> {
    let ip_address = client_ip(&request);

    let context = if let Some(api_key) = extract_api_key(&request) {
        let (user, api_key_id) = resolve_api_key_principal(&state, &api_key).await?;
        let permissions = state.guard.resolve(&user).await?;
        AuthContext {
            user,
            permissions,
            api_key_id: Some(api_key_id),
            session_id: None,
            ip_address,
        }
    } else if let Some((user, session_id, csrf_token)) =
        resolve_session_principal(&state, request.headers()).await?
    {
        // State-changing requests must echo the session's CSRF token
        let mutating = !matches!(
            *request.method(),
            Method::GET | Method::HEAD | Method::OPTIONS
        );
        if mutating {
            let presented = request
                .headers()
                .get("x-csrf-token")
                .and_then(|v| v.to_str().ok());
            if presented != Some(csrf_token.as_str()) {
                warn!(path = %request.uri().path(), "CSRF token mismatch");
                return Err(Error::Forbidden("CSRF token mismatch".to_string()).into());
            }
        }

        let permissions = state.guard.resolve(&user).await?;
        AuthContext {
            user,
            permissions,
            api_key_id: None,
            session_id: Some(session_id),
            ip_address,
        }
    } else {
        debug!(path = %request.uri().path(), "No credentials presented");
        return Err(Error::Unauthorised("Authentication required".to_string()).into());
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Rate-limit middleware for the whole API surface. Keys on the API key
/// prefix when one is presented, otherwise the client IP.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, crate::ApiError> {
    if state.config.rate_limit.enabled {
        let key = extract_api_key(&request)
            .as_deref()
            .filter(|k| k.len() >= 8)
            .map(|k| format!("key:{}", &k[..8]))
            .or_else(|| client_ip(&request).map(|ip| format!("ip:{}", ip)))
            .unwrap_or_else(|| "anonymous".to_string());

        state.limiter.check(&key)?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    #[test]
    fn test_verify_sha256_key() {
        let key = "ok_live_0123456789abcdef";
        let stored = sha256_hex(key);

        assert!(verify_api_key(key, &stored));
        assert!(!verify_api_key("ok_live_wrong", &stored));
    }

    #[test]
    fn test_verify_argon2_key() {
        let key = "ok_live_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(key.as_bytes(), &salt)
            .expect("argon2 hashing should succeed")
            .to_string();

        assert!(verify_api_key(key, &hash));
        assert!(!verify_api_key("wrong", &hash));
    }

    #[test]
    fn test_sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }
}
