//! Custom field definition catalog repository
//!
//! Catalog CRUD only; the validation engine that consumes these definitions
//! lives outside this service.

use crate::db::DatabasePool;
use crate::models::CustomFieldDefinition;
use crate::repository::map_write_err;
use opsdesk_common::types::CustomFieldId;
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// Input for creating or replacing a definition
#[derive(Debug, Clone)]
pub struct UpsertCustomField {
    pub entity_type: String,
    pub name: String,
    pub field_key: String,
    pub field_type: String,
    pub options: serde_json::Value,
    pub required: bool,
    pub sort_order: i32,
}

/// Custom field definition repository
#[derive(Clone)]
pub struct CustomFieldRepository {
    pool: DatabasePool,
}

impl CustomFieldRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a definition. A duplicate (entity_type, field_key) pair
    /// surfaces as `Conflict`.
    pub async fn create(&self, input: UpsertCustomField) -> Result<CustomFieldDefinition> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO custom_field_definitions (
                id, entity_type, name, field_key, field_type, options,
                required, sort_order, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(&input.entity_type)
        .bind(&input.name)
        .bind(&input.field_key)
        .bind(&input.field_type)
        .bind(&input.options)
        .bind(input.required)
        .bind(input.sort_order)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created definition".to_string()))
    }

    /// Get a definition by ID
    pub async fn get(&self, id: CustomFieldId) -> Result<Option<CustomFieldDefinition>> {
        sqlx::query_as::<_, CustomFieldDefinition>(
            "SELECT * FROM custom_field_definitions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// List definitions, optionally for one entity type, in display order
    pub async fn list(&self, entity_type: Option<&str>) -> Result<Vec<CustomFieldDefinition>> {
        match entity_type {
            Some(entity) => sqlx::query_as::<_, CustomFieldDefinition>(
                r#"
                SELECT * FROM custom_field_definitions
                WHERE entity_type = $1
                ORDER BY sort_order ASC, name ASC
                "#,
            )
            .bind(entity)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string())),
            None => sqlx::query_as::<_, CustomFieldDefinition>(
                "SELECT * FROM custom_field_definitions ORDER BY entity_type, sort_order, name",
            )
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string())),
        }
    }

    /// Replace a definition in full
    pub async fn update(
        &self,
        id: CustomFieldId,
        input: UpsertCustomField,
    ) -> Result<CustomFieldDefinition> {
        let result = sqlx::query(
            r#"
            UPDATE custom_field_definitions
            SET entity_type = $2, name = $3, field_key = $4, field_type = $5,
                options = $6, required = $7, sort_order = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.entity_type)
        .bind(&input.name)
        .bind(&input.field_key)
        .bind(&input.field_type)
        .bind(&input.options)
        .bind(input.required)
        .bind(input.sort_order)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Custom field {} not found", id)));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Custom field {} not found", id)))
    }

    /// Delete a definition
    pub async fn delete(&self, id: CustomFieldId) -> Result<()> {
        let result = sqlx::query("DELETE FROM custom_field_definitions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Custom field {} not found", id)));
        }
        Ok(())
    }
}
