//! Common types for opsdesk

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for companies (tenants)
pub type CompanyId = Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for tickets
pub type TicketId = Uuid;

/// Unique identifier for ticket replies
pub type ReplyId = Uuid;

/// Unique identifier for automation rules
pub type RuleId = Uuid;

/// Unique identifier for automation runs
pub type RunId = Uuid;

/// Unique identifier for notifications
pub type NotificationId = Uuid;

/// Unique identifier for email tracking sends
pub type TrackingId = Uuid;

/// Unique identifier for custom field definitions
pub type CustomFieldId = Uuid;

/// Ticket lifecycle events crossing the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TicketCreated,
    TicketUpdated,
    TicketReplyAdded,
    TicketWatcherAdded,
    TicketWatcherRemoved,
}

impl EventType {
    /// Wire name of the event, as stored in rule triggers and catalogs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TicketCreated => "ticket.created",
            EventType::TicketUpdated => "ticket.updated",
            EventType::TicketReplyAdded => "ticket.reply_added",
            EventType::TicketWatcherAdded => "ticket.watcher_added",
            EventType::TicketWatcherRemoved => "ticket.watcher_removed",
        }
    }

    /// Parse a wire name back into an event type
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket.created" => Some(EventType::TicketCreated),
            "ticket.updated" => Some(EventType::TicketUpdated),
            "ticket.reply_added" => Some(EventType::TicketReplyAdded),
            "ticket.watcher_added" => Some(EventType::TicketWatcherAdded),
            "ticket.watcher_removed" => Some(EventType::TicketWatcherRemoved),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership status within a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Invited,
    Active,
    Suspended,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Invited => "invited",
            MembershipStatus::Active => "active",
            MembershipStatus::Suspended => "suspended",
        }
    }
}

/// Automation rule kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Scheduled,
    Event,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Scheduled => "scheduled",
            RuleKind::Event => "event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RuleKind::Scheduled),
            "event" => Some(RuleKind::Event),
            _ => None,
        }
    }
}

/// Outcome of a single automation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// Notification delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::InApp => write!(f, "in_app"),
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Offset pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> i64 {
    50
}

impl Pagination {
    /// Clamp limit into a sane range
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 200),
            offset: self.offset.max(0),
        }
    }
}

/// Paginated response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for event in [
            EventType::TicketCreated,
            EventType::TicketUpdated,
            EventType::TicketReplyAdded,
            EventType::TicketWatcherAdded,
            EventType::TicketWatcherRemoved,
        ] {
            assert_eq!(EventType::parse(event.as_str()), Some(event));
        }
        assert_eq!(EventType::parse("ticket.unknown"), None);
    }

    #[test]
    fn test_pagination_clamp() {
        let page = Pagination {
            limit: 10_000,
            offset: -4,
        }
        .clamped();
        assert_eq!(page.limit, 200);
        assert_eq!(page.offset, 0);
    }
}
