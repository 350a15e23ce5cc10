//! Session repository

use crate::db::DatabasePool;
use crate::models::Session;
use chrono::{DateTime, Utc};
use opsdesk_common::types::UserId;
use opsdesk_common::{Error, Result};

/// Session repository
#[derive(Clone)]
pub struct SessionRepository {
    pool: DatabasePool,
}

impl SessionRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Persist a new session. Token generation happens in the auth layer.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: &str,
        user_id: UserId,
        csrf_token: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, csrf_token, ip_address, user_agent, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(csrf_token)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created session".to_string()))
    }

    /// Get a session by token
    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Delete a session (logout). Deleting an absent session succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
