//! API key repository
//!
//! Keys are looked up by their stored prefix; the full secret is only ever
//! compared against the stored hash in the auth layer.

use crate::db::DatabasePool;
use crate::models::ApiKey;
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// API key repository
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: DatabasePool,
}

impl ApiKeyRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Candidate keys sharing a prefix
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_prefix = $1")
            .bind(prefix)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Touch `last_used_at`. Fired after successful auth, best-effort.
    pub async fn update_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
