//! opsdesk Storage - Database access layer
//!
//! This crate provides the PostgreSQL access layer for opsdesk:
//! the connection pool, row models, and one repository per aggregate.

pub mod db;
pub mod models;
pub mod repository;
pub mod schema;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
