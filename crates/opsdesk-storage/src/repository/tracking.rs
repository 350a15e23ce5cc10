//! Email tracking repository

use crate::db::DatabasePool;
use crate::models::{EmailTrackingEvent, EmailTrackingSend};
use opsdesk_common::types::{CompanyId, TrackingId};
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// Email tracking repository
#[derive(Clone)]
pub struct TrackingRepository {
    pool: DatabasePool,
}

impl TrackingRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Register an outbound tracked email, returning its tracking id
    pub async fn create_send(
        &self,
        company_id: Option<CompanyId>,
        recipient: &str,
        subject: Option<&str>,
    ) -> Result<TrackingId> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO email_tracking_sends (id, company_id, recipient, subject, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(recipient)
        .bind(subject)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(id)
    }

    /// Look up a tracked send
    pub async fn get_send(&self, id: TrackingId) -> Result<Option<EmailTrackingSend>> {
        sqlx::query_as::<_, EmailTrackingSend>("SELECT * FROM email_tracking_sends WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Record an open/click event against a tracked send
    #[allow(clippy::too_many_arguments)]
    pub async fn record_event(
        &self,
        send_id: TrackingId,
        event_type: &str,
        url: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO email_tracking_events (
                id, send_id, event_type, url, ip_address, user_agent, referer, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(send_id)
        .bind(event_type)
        .bind(url)
        .bind(ip_address)
        .bind(user_agent)
        .bind(referer)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Events for a tracked send, oldest first
    pub async fn list_events(&self, send_id: TrackingId) -> Result<Vec<EmailTrackingEvent>> {
        sqlx::query_as::<_, EmailTrackingEvent>(
            "SELECT * FROM email_tracking_events WHERE send_id = $1 ORDER BY created_at ASC",
        )
        .bind(send_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
