//! Ticket repository
//!
//! Row-group transactionality: a ticket and its replies/watchers are always
//! mutated inside one transaction, so a reply insert and the parent's
//! `updated_at` touch commit or roll back together.

use crate::db::DatabasePool;
use crate::models::{Ticket, TicketReply, TicketWatcher};
use crate::repository::map_write_err;
use chrono::{DateTime, Utc};
use opsdesk_common::types::{CompanyId, Page, Pagination, TicketId, UserId};
use opsdesk_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

/// Input for creating a ticket. Status and priority arrive already resolved.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub subject: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub module_slug: Option<String>,
    pub external_provider: Option<String>,
    pub external_reference: Option<String>,
    pub company_id: Option<CompanyId>,
    pub requester_id: Option<UserId>,
    pub assigned_user_id: Option<UserId>,
    /// Set when the initial status is terminal
    pub closed_at: Option<DateTime<Utc>>,
}

/// Sparse ticket patch. `None` leaves a column untouched; the inner Option
/// of double-wrapped fields writes NULL.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub subject: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<Option<String>>,
    pub module_slug: Option<Option<String>>,
    pub assigned_user_id: Option<Option<UserId>>,
    pub ai_summary: Option<Option<String>>,
    pub ai_summary_status: Option<Option<String>>,
    pub ai_tags: Option<Vec<String>>,
    /// Decided by the status engine from the terminal set
    pub closed_at: Option<Option<DateTime<Utc>>>,
}

impl TicketPatch {
    /// Whether the patch writes anything at all
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.module_slug.is_none()
            && self.assigned_user_id.is_none()
            && self.ai_summary.is_none()
            && self.ai_summary_status.is_none()
            && self.ai_tags.is_none()
            && self.closed_at.is_none()
    }
}

/// Query filters for listing tickets
#[derive(Debug, Clone, Default)]
pub struct ListTicketsFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub company_id: Option<CompanyId>,
    pub module_slug: Option<String>,
    pub assigned_user_id: Option<UserId>,
    pub search: Option<String>,
    /// Restrict to these companies (tenant scoping); `None` means unscoped
    pub visible_companies: Option<Vec<CompanyId>>,
}

/// Ticket repository
#[derive(Clone)]
pub struct TicketRepository {
    pool: DatabasePool,
}

impl TicketRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a ticket
    pub async fn create(&self, input: CreateTicket) -> Result<Ticket> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let empty_tags = serde_json::Value::Array(vec![]);

        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, subject, description, status, priority, category,
                module_slug, external_provider, external_reference, company_id,
                requester_id, assigned_user_id, ai_tags, created_at, updated_at, closed_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
            )
            "#,
        )
        .bind(id)
        .bind(&input.subject)
        .bind(&input.description)
        .bind(&input.status)
        .bind(&input.priority)
        .bind(&input.category)
        .bind(&input.module_slug)
        .bind(&input.external_provider)
        .bind(&input.external_reference)
        .bind(input.company_id)
        .bind(input.requester_id)
        .bind(input.assigned_user_id)
        .bind(&empty_tags)
        .bind(now)
        .bind(now)
        .bind(input.closed_at)
        .execute(self.pool.pool())
        .await
        .map_err(map_write_err)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to retrieve created ticket".to_string()))
    }

    /// Get a ticket by ID
    pub async fn get(&self, id: TicketId) -> Result<Option<Ticket>> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// List tickets with filters and offset pagination
    pub async fn list(&self, filter: &ListTicketsFilter, page: Pagination) -> Result<Page<Ticket>> {
        let (where_clause, binds) = Self::build_where(filter);

        let list_sql = format!(
            "SELECT * FROM tickets{} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            where_clause,
            binds.len() + 1,
            binds.len() + 2
        );
        let count_sql = format!("SELECT COUNT(*) AS count FROM tickets{}", where_clause);

        let mut list_query = sqlx::query_as::<_, Ticket>(&list_sql);
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            list_query = bind.apply_as(list_query);
            count_query = bind.apply(count_query);
        }

        let page = page.clamped();
        let items = list_query
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let total = count_query
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .get::<i64, _>("count");

        Ok(Page { items, total })
    }

    fn build_where(filter: &ListTicketsFilter) -> (String, Vec<Bind>) {
        let mut clauses = Vec::new();
        let mut binds: Vec<Bind> = Vec::new();

        if let Some(status) = &filter.status {
            binds.push(Bind::Text(status.clone()));
            clauses.push(format!("status = ${}", binds.len()));
        }
        if let Some(priority) = &filter.priority {
            binds.push(Bind::Text(priority.clone()));
            clauses.push(format!("priority = ${}", binds.len()));
        }
        if let Some(company_id) = filter.company_id {
            binds.push(Bind::Id(company_id));
            clauses.push(format!("company_id = ${}", binds.len()));
        }
        if let Some(module_slug) = &filter.module_slug {
            binds.push(Bind::Text(module_slug.clone()));
            clauses.push(format!("module_slug = ${}", binds.len()));
        }
        if let Some(assigned) = filter.assigned_user_id {
            binds.push(Bind::Id(assigned));
            clauses.push(format!("assigned_user_id = ${}", binds.len()));
        }
        if let Some(search) = &filter.search {
            binds.push(Bind::Text(format!("%{}%", search)));
            let idx = binds.len();
            clauses.push(format!(
                "(subject ILIKE ${idx} OR description ILIKE ${idx})"
            ));
        }
        if let Some(companies) = &filter.visible_companies {
            binds.push(Bind::IdList(companies.clone()));
            clauses.push(format!("company_id = ANY(${})", binds.len()));
        }

        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), binds)
        }
    }

    /// Apply a sparse patch. Every write touches `updated_at`.
    pub async fn update(&self, id: TicketId, patch: &TicketPatch) -> Result<Ticket> {
        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut idx = 2;

        macro_rules! push_set {
            ($field:expr, $column:literal) => {
                if $field.is_some() {
                    sets.push(format!(concat!($column, " = ${}"), idx));
                    idx += 1;
                }
            };
        }

        push_set!(patch.subject, "subject");
        push_set!(patch.description, "description");
        push_set!(patch.status, "status");
        push_set!(patch.priority, "priority");
        push_set!(patch.category, "category");
        push_set!(patch.module_slug, "module_slug");
        push_set!(patch.assigned_user_id, "assigned_user_id");
        push_set!(patch.ai_summary, "ai_summary");
        push_set!(patch.ai_summary_status, "ai_summary_status");
        if patch.ai_summary.is_some() {
            sets.push("ai_summary_generated_at = NOW()".to_string());
        }
        push_set!(patch.ai_tags, "ai_tags");
        if patch.ai_tags.is_some() {
            sets.push("ai_tags_generated_at = NOW()".to_string());
        }
        push_set!(patch.closed_at, "closed_at");

        let query = format!("UPDATE tickets SET {} WHERE id = $1", sets.join(", "));
        let mut q = sqlx::query(&query).bind(id);

        if let Some(v) = &patch.subject {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.description {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.status {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.priority {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.category {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.module_slug {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.assigned_user_id {
            q = q.bind(*v);
        }
        if let Some(v) = &patch.ai_summary {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.ai_summary_status {
            q = q.bind(v.clone());
        }
        if let Some(v) = &patch.ai_tags {
            let tags = serde_json::to_value(v).map_err(|e| Error::Internal(e.to_string()))?;
            q = q.bind(tags);
        }
        if let Some(v) = &patch.closed_at {
            q = q.bind(*v);
        }

        let result = q
            .execute(self.pool.pool())
            .await
            .map_err(map_write_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Ticket {} not found", id)));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ticket {} not found", id)))
    }

    /// Add a reply and touch the parent's `updated_at` in one transaction.
    /// `closed_at` is never changed here: a reply does not reopen a ticket.
    pub async fn add_reply(
        &self,
        ticket_id: TicketId,
        author_id: Option<UserId>,
        body: &str,
        is_internal: bool,
    ) -> Result<TicketReply> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let updated = sqlx::query("UPDATE tickets SET updated_at = $2 WHERE id = $1")
            .bind(ticket_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Ticket {} not found", ticket_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO ticket_replies (id, ticket_id, author_id, body, is_internal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(ticket_id)
        .bind(author_id)
        .bind(body)
        .bind(is_internal)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(TicketReply {
            id,
            ticket_id,
            author_id,
            body: body.to_string(),
            is_internal,
            created_at: now,
        })
    }

    /// List replies for a ticket, oldest first
    pub async fn list_replies(
        &self,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketReply>> {
        let sql = if include_internal {
            "SELECT * FROM ticket_replies WHERE ticket_id = $1 ORDER BY created_at ASC"
        } else {
            "SELECT * FROM ticket_replies WHERE ticket_id = $1 AND is_internal = false ORDER BY created_at ASC"
        };

        sqlx::query_as::<_, TicketReply>(sql)
            .bind(ticket_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Add a watcher. Re-adding an existing watcher is a no-op success;
    /// returns whether a row was actually inserted.
    pub async fn add_watcher(&self, ticket_id: TicketId, user_id: UserId) -> Result<bool> {
        let exists = sqlx::query("SELECT 1 FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("Ticket {} not found", ticket_id)));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO ticket_watchers (ticket_id, user_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (ticket_id, user_id) DO NOTHING
            "#,
        )
        .bind(ticket_id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a watcher. Removing an absent watcher succeeds silently;
    /// returns whether a row was actually deleted.
    pub async fn remove_watcher(&self, ticket_id: TicketId, user_id: UserId) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM ticket_watchers WHERE ticket_id = $1 AND user_id = $2")
                .bind(ticket_id)
                .bind(user_id)
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// List watchers for a ticket, ordered by when they subscribed
    pub async fn list_watchers(&self, ticket_id: TicketId) -> Result<Vec<TicketWatcher>> {
        sqlx::query_as::<_, TicketWatcher>(
            "SELECT * FROM ticket_watchers WHERE ticket_id = $1 ORDER BY created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

/// A deferred bind value for dynamically assembled queries
enum Bind {
    Text(String),
    Id(Uuid),
    IdList(Vec<Uuid>),
}

impl Bind {
    fn apply<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match self {
            Bind::Text(v) => query.bind(v.clone()),
            Bind::Id(v) => query.bind(*v),
            Bind::IdList(v) => query.bind(v.clone()),
        }
    }

    fn apply_as<'q, T>(
        &self,
        query: sqlx::query::QueryAs<'q, sqlx::Postgres, T, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Postgres, T, sqlx::postgres::PgArguments> {
        match self {
            Bind::Text(v) => query.bind(v.clone()),
            Bind::Id(v) => query.bind(*v),
            Bind::IdList(v) => query.bind(v.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_emptiness() {
        assert!(TicketPatch::default().is_empty());

        let patch = TicketPatch {
            priority: Some("high".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_build_where_numbering() {
        let filter = ListTicketsFilter {
            status: Some("open".to_string()),
            search: Some("printer".to_string()),
            ..Default::default()
        };
        let (clause, binds) = TicketRepository::build_where(&filter);
        assert_eq!(
            clause,
            " WHERE status = $1 AND (subject ILIKE $2 OR description ILIKE $2)"
        );
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_build_where_empty() {
        let (clause, binds) = TicketRepository::build_where(&ListTicketsFilter::default());
        assert!(clause.is_empty());
        assert!(binds.is_empty());
    }
}
