//! User, role, and membership repository

use crate::db::DatabasePool;
use crate::models::{Membership, Role, User};
use crate::repository::map_write_err;
use opsdesk_common::types::{CompanyId, MembershipStatus, UserId};
use opsdesk_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub is_super_admin: bool,
}

/// One membership with the role's permission set joined in.
///
/// The guard merges `role_permissions` with `extra_permissions` per company;
/// only `active` memberships are returned here, so suspended or invited
/// members grant nothing.
#[derive(Debug, Clone)]
pub struct MembershipGrant {
    pub company_id: CompanyId,
    pub role_slug: String,
    pub role_permissions: Vec<String>,
    pub extra_permissions: Vec<String>,
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: DatabasePool,
}

impl UserRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a user
    pub async fn create(&self, input: CreateUser) -> Result<User> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, phone, is_super_admin, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(input.is_super_admin)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created user".to_string()))
    }

    /// Get a user by ID
    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Get several users at once (notification recipient resolution)
    pub async fn get_many(&self, ids: &[UserId]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Number of user rows (bootstrap check)
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("count"))
    }

    /// All memberships for a user, any status
    pub async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Active memberships for a user with the role permissions joined in
    pub async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<MembershipGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT m.company_id, m.role_slug, m.extra_permissions, r.permissions
            FROM memberships m
            JOIN roles r ON r.slug = m.role_slug
            WHERE m.user_id = $1 AND m.status = $2
            "#,
        )
        .bind(user_id)
        .bind(MembershipStatus::Active.as_str())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| MembershipGrant {
                company_id: row.get("company_id"),
                role_slug: row.get("role_slug"),
                role_permissions: serde_json::from_value(row.get("permissions"))
                    .unwrap_or_default(),
                extra_permissions: serde_json::from_value(row.get("extra_permissions"))
                    .unwrap_or_default(),
            })
            .collect())
    }

    /// Active members of a company whose role carries `company.admin`
    pub async fn company_admins(&self, company_id: CompanyId) -> Result<Vec<User>> {
        let marker = serde_json::json!(["company.admin"]);

        sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN memberships m ON m.user_id = u.id
            JOIN roles r ON r.slug = m.role_slug
            WHERE m.company_id = $1 AND m.status = $2
              AND u.active AND r.permissions @> $3
            "#,
        )
        .bind(company_id)
        .bind(MembershipStatus::Active.as_str())
        .bind(&marker)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Create or update a role definition
    pub async fn upsert_role(&self, role: &Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (slug, name, permissions)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                permissions = EXCLUDED.permissions
            "#,
        )
        .bind(&role.slug)
        .bind(&role.name)
        .bind(&role.permissions)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}
