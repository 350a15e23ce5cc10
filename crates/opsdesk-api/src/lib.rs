//! opsdesk API - REST and JSON-RPC surface
//!
//! Axum routers over the core services: ticket lifecycle, status catalog,
//! automation rules, notifications, custom-field definitions, email
//! tracking, and the MCP (JSON-RPC) adapter. Authentication accepts API
//! keys and session cookies; every handler runs behind the permission
//! guard and the sliding-window rate limiter.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use auth::{AppState, AuthContext};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
