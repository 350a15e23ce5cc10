//! Audit log repository
//!
//! Previous/new-value diffs are stored as opaque JSON blobs; consumers must
//! not rely on field-order stability.

use crate::db::DatabasePool;
use crate::models::AuditLogEntry;
use opsdesk_common::types::UserId;
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// An audit entry to record
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub user_id: Option<UserId>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub previous_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub api_key_id: Option<Uuid>,
    pub ip_address: Option<String>,
}

/// Audit log repository
#[derive(Clone)]
pub struct AuditRepository {
    pool: DatabasePool,
}

impl AuditRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Append an entry
    pub async fn insert(&self, entry: &NewAuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id, user_id, action, entity_type, entity_id,
                previous_value, new_value, metadata, api_key_id, ip_address, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.previous_value)
        .bind(&entry.new_value)
        .bind(&entry.metadata)
        .bind(entry.api_key_id)
        .bind(&entry.ip_address)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Entries for one entity, newest first
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT * FROM audit_log_entries
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Most recent entries across all entities
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM audit_log_entries ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
