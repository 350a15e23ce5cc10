//! Notification catalog, preference, and feed repository

use crate::db::DatabasePool;
use crate::models::{Notification, NotificationEventSetting, NotificationPreference};
use chrono::Utc;
use opsdesk_common::types::{NotificationId, UserId};
use opsdesk_common::{Error, Result};
use uuid::Uuid;

/// Notification repository
#[derive(Clone)]
pub struct NotificationRepository {
    pool: DatabasePool,
}

impl NotificationRepository {
    /// Create a new repository
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Catalog entry for an event type, if configured
    pub async fn get_setting(&self, event_type: &str) -> Result<Option<NotificationEventSetting>> {
        sqlx::query_as::<_, NotificationEventSetting>(
            "SELECT * FROM notification_event_settings WHERE event_type = $1",
        )
        .bind(event_type)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Full catalog, for the settings surface
    pub async fn list_settings(&self) -> Result<Vec<NotificationEventSetting>> {
        sqlx::query_as::<_, NotificationEventSetting>(
            "SELECT * FROM notification_event_settings ORDER BY event_type ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Create or update a catalog entry
    pub async fn upsert_setting(&self, setting: &NotificationEventSetting) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_event_settings (
                event_type, display_name, description, message_template,
                user_visible, broadcast, allow_in_app, allow_email, allow_sms,
                default_in_app, default_email, default_sms, module_actions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (event_type) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                description = EXCLUDED.description,
                message_template = EXCLUDED.message_template,
                user_visible = EXCLUDED.user_visible,
                broadcast = EXCLUDED.broadcast,
                allow_in_app = EXCLUDED.allow_in_app,
                allow_email = EXCLUDED.allow_email,
                allow_sms = EXCLUDED.allow_sms,
                default_in_app = EXCLUDED.default_in_app,
                default_email = EXCLUDED.default_email,
                default_sms = EXCLUDED.default_sms,
                module_actions = EXCLUDED.module_actions
            "#,
        )
        .bind(&setting.event_type)
        .bind(&setting.display_name)
        .bind(&setting.description)
        .bind(&setting.message_template)
        .bind(setting.user_visible)
        .bind(setting.broadcast)
        .bind(setting.allow_in_app)
        .bind(setting.allow_email)
        .bind(setting.allow_sms)
        .bind(setting.default_in_app)
        .bind(setting.default_email)
        .bind(setting.default_sms)
        .bind(&setting.module_actions)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Stored preferences for a set of users on one event type.
    /// Users without a row fall back to the catalog defaults.
    pub async fn get_preferences(
        &self,
        user_ids: &[UserId],
        event_type: &str,
    ) -> Result<Vec<NotificationPreference>> {
        sqlx::query_as::<_, NotificationPreference>(
            r#"
            SELECT * FROM notification_preferences
            WHERE event_type = $1 AND user_id = ANY($2)
            "#,
        )
        .bind(event_type)
        .bind(user_ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// All stored preferences for one user
    pub async fn list_preferences_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<NotificationPreference>> {
        sqlx::query_as::<_, NotificationPreference>(
            "SELECT * FROM notification_preferences WHERE user_id = $1 ORDER BY event_type",
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a per-user channel preference
    pub async fn set_preference(&self, pref: &NotificationPreference) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id, event_type, in_app, email, sms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, event_type) DO UPDATE SET
                in_app = EXCLUDED.in_app,
                email = EXCLUDED.email,
                sms = EXCLUDED.sms
            "#,
        )
        .bind(pref.user_id)
        .bind(&pref.event_type)
        .bind(pref.in_app)
        .bind(pref.email)
        .bind(pref.sms)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Insert an in-app notification row. `user_id = None` is a broadcast.
    pub async fn insert(
        &self,
        user_id: Option<UserId>,
        event_type: &str,
        message: &str,
        metadata: &serde_json::Value,
    ) -> Result<Notification> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, event_type, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(event_type)
        .bind(message)
        .bind(metadata)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Notification {
            id,
            user_id,
            event_type: event_type.to_string(),
            message: message.to_string(),
            metadata: metadata.clone(),
            created_at: now,
            read_at: None,
        })
    }

    /// Feed for a user: their rows plus broadcasts, newest first
    pub async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 OR user_id IS NULL
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Mark a notification read; only the addressed user may do so
    pub async fn mark_read(&self, id: NotificationId, user_id: UserId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read_at = NOW()
            WHERE id = $1 AND (user_id = $2 OR user_id IS NULL) AND read_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }
}
