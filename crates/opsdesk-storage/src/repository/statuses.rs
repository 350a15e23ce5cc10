//! Ticket status catalog repository
//!
//! The replace operation owns the rename-with-rewrite transaction; the
//! status engine validates and normalises definitions before they get here.

use crate::db::DatabasePool;
use crate::models::TicketStatus;
use opsdesk_common::{Error, Result};
use sqlx::Row;
use std::collections::HashSet;

/// A validated incoming status definition
#[derive(Debug, Clone)]
pub struct StatusDefinition {
    pub tech_status: String,
    pub tech_label: String,
    pub public_status: String,
    pub is_default: bool,
    /// Present when this definition updates (and possibly renames) an
    /// existing row
    pub original_slug: Option<String>,
}

/// Status catalog repository
#[derive(Clone)]
pub struct StatusRepository {
    pool: DatabasePool,
}

impl StatusRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// List all statuses ordered by label
    pub async fn list(&self) -> Result<Vec<TicketStatus>> {
        sqlx::query_as::<_, TicketStatus>(
            "SELECT * FROM ticket_statuses ORDER BY tech_label ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Number of catalog rows
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM ticket_statuses")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("count"))
    }

    /// Find a status by slug
    pub async fn find(&self, slug: &str) -> Result<Option<TicketStatus>> {
        sqlx::query_as::<_, TicketStatus>(
            "SELECT * FROM ticket_statuses WHERE tech_status = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Get the default status row
    pub async fn get_default(&self) -> Result<Option<TicketStatus>> {
        sqlx::query_as::<_, TicketStatus>(
            "SELECT * FROM ticket_statuses WHERE is_default = true LIMIT 1",
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Insert seed rows. Only called on an empty catalog.
    pub async fn seed(&self, definitions: &[StatusDefinition]) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        for def in definitions {
            sqlx::query(
                r#"
                INSERT INTO ticket_statuses (tech_status, tech_label, public_status, is_default)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tech_status) DO NOTHING
                "#,
            )
            .bind(&def.tech_status)
            .bind(&def.tech_label)
            .bind(&def.public_status)
            .bind(def.is_default)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Atomically replace the catalog with the incoming definitions.
    ///
    /// Rows matched by `original_slug` are updated in place; a changed slug
    /// rewrites every referencing ticket inside the same transaction. Rows
    /// absent from the incoming set are deleted, unless tickets still
    /// reference them, in which case the whole transaction fails with
    /// `InUse` and nothing is modified.
    pub async fn replace(&self, definitions: &[StatusDefinition]) -> Result<()> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let current: Vec<String> =
            sqlx::query("SELECT tech_status FROM ticket_statuses ORDER BY tech_status")
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?
                .into_iter()
                .map(|row| row.get::<String, _>("tech_status"))
                .collect();
        let current: HashSet<String> = current.into_iter().collect();

        let mut surviving: HashSet<String> = HashSet::new();

        for def in definitions {
            match def.original_slug.as_deref().filter(|o| current.contains(*o)) {
                Some(original) => {
                    surviving.insert(original.to_string());

                    sqlx::query(
                        r#"
                        UPDATE ticket_statuses
                        SET tech_status = $2, tech_label = $3, public_status = $4, is_default = $5
                        WHERE tech_status = $1
                        "#,
                    )
                    .bind(original)
                    .bind(&def.tech_status)
                    .bind(&def.tech_label)
                    .bind(&def.public_status)
                    .bind(def.is_default)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Error::Database(e.to_string()))?;

                    if original != def.tech_status {
                        sqlx::query("UPDATE tickets SET status = $2 WHERE status = $1")
                            .bind(original)
                            .bind(&def.tech_status)
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| Error::Database(e.to_string()))?;
                    }
                }
                None => {
                    // A definition whose slug already exists updates that
                    // row rather than inserting a duplicate.
                    surviving.insert(def.tech_status.clone());

                    sqlx::query(
                        r#"
                        INSERT INTO ticket_statuses (tech_status, tech_label, public_status, is_default)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (tech_status) DO UPDATE
                        SET tech_label = EXCLUDED.tech_label,
                            public_status = EXCLUDED.public_status,
                            is_default = EXCLUDED.is_default
                        "#,
                    )
                    .bind(&def.tech_status)
                    .bind(&def.tech_label)
                    .bind(&def.public_status)
                    .bind(def.is_default)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Error::Database(e.to_string()))?;
                }
            }
        }

        let removals: Vec<String> = current
            .iter()
            .filter(|slug| !surviving.contains(*slug))
            .cloned()
            .collect();

        if !removals.is_empty() {
            let referenced: Vec<String> = sqlx::query(
                "SELECT DISTINCT status FROM tickets WHERE status = ANY($1)",
            )
            .bind(&removals)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .into_iter()
            .map(|row| row.get::<String, _>("status"))
            .collect();

            if !referenced.is_empty() {
                // Dropping tx rolls everything back, including any renames
                return Err(Error::InUse(referenced));
            }

            sqlx::query("DELETE FROM ticket_statuses WHERE tech_status = ANY($1)")
                .bind(&removals)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
