//! Company (tenant) repository

use crate::db::DatabasePool;
use crate::models::Company;
use crate::repository::map_write_err;
use opsdesk_common::types::CompanyId;
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// Company repository
#[derive(Clone)]
pub struct CompanyRepository {
    pool: DatabasePool,
}

impl CompanyRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a company. Slug uniqueness surfaces as `Conflict`.
    pub async fn create(&self, name: &str, slug: &str) -> Result<Company> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO companies (id, name, slug, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'active', NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(slug)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created company".to_string()))
    }

    /// Get a company by ID
    pub async fn get(&self, id: CompanyId) -> Result<Option<Company>> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// List all companies ordered by name
    pub async fn list(&self) -> Result<Vec<Company>> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name ASC")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
