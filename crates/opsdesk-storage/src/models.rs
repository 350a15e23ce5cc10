//! Database models

use chrono::{DateTime, Utc};
use opsdesk_common::types::{
    CompanyId, CustomFieldId, NotificationId, ReplyId, RuleId, RunId, TicketId, TrackingId, UserId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Company (tenant) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub is_super_admin: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub slug: String,
    pub name: String,
    pub permissions: serde_json::Value,
}

/// Membership model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role_slug: String,
    pub status: String,
    pub extra_permissions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// User-specific grants as a vector of slugs
    pub fn extra_permissions_vec(&self) -> Vec<String> {
        serde_json::from_value(self.extra_permissions.clone()).unwrap_or_default()
    }
}

/// API key model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|e| e < Utc::now()).unwrap_or(false)
    }
}

/// Session model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub csrf_token: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Ticket status catalog row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketStatus {
    pub tech_status: String,
    pub tech_label: String,
    pub public_status: String,
    pub is_default: bool,
}

/// Ticket model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
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
    pub ai_summary: Option<String>,
    pub ai_summary_status: Option<String>,
    pub ai_summary_generated_at: Option<DateTime<Utc>>,
    pub ai_tags: serde_json::Value,
    pub ai_tags_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// AI tags as an ordered vector
    pub fn ai_tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.ai_tags.clone()).unwrap_or_default()
    }
}

/// Ticket reply model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketReply {
    pub id: ReplyId,
    pub ticket_id: TicketId,
    pub author_id: Option<UserId>,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Ticket watcher model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketWatcher {
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Automation rule model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub kind: String,
    pub cadence: Option<String>,
    pub cron_expression: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub run_once: bool,
    pub trigger_event: Option<String>,
    pub trigger_filters: serde_json::Value,
    pub action_module: String,
    pub action_payload: serde_json::Value,
    pub status: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRule {
    /// Whether the rule is eligible to fire
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Automation run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutomationRun {
    pub id: RunId,
    pub rule_id: RuleId,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub result_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Notification catalog entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationEventSetting {
    pub event_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub message_template: String,
    pub user_visible: bool,
    pub broadcast: bool,
    pub allow_in_app: bool,
    pub allow_email: bool,
    pub allow_sms: bool,
    pub default_in_app: bool,
    pub default_email: bool,
    pub default_sms: bool,
    pub module_actions: serde_json::Value,
}

/// A module action configured on a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleActionSpec {
    pub module: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NotificationEventSetting {
    /// Configured module actions, skipping malformed entries
    pub fn module_actions_vec(&self) -> Vec<ModuleActionSpec> {
        serde_json::from_value(self.module_actions.clone()).unwrap_or_default()
    }
}

/// Per-user channel preference for one event type
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: UserId,
    pub event_type: String,
    pub in_app: bool,
    pub email: bool,
    pub sms: bool,
}

/// In-app notification row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: Option<UserId>,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Audit log row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub previous_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub api_key_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tracked outbound email
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailTrackingSend {
    pub id: TrackingId,
    pub company_id: Option<CompanyId>,
    pub recipient: String,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Open/click event on a tracked email
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailTrackingEvent {
    pub id: Uuid,
    pub send_id: TrackingId,
    pub event_type: String,
    pub url: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Custom field definition (catalog only)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: CustomFieldId,
    pub entity_type: String,
    pub name: String,
    pub field_key: String,
    pub field_type: String,
    pub options: serde_json::Value,
    pub required: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
