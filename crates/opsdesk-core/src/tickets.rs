//! Ticket service
//!
//! Orchestrates the ticket store, the status engine, the sanitizer, the
//! audit recorder, and the event bus. Every mutation goes through here so
//! that status transitions round-trip the engine, `closed_at` tracks the
//! terminal set, and exactly one event leaves the bus per committed write.

use crate::audit::AuditRecorder;
use crate::bus::{Actor, Event, EventBus};
use crate::sanitize::Sanitizer;
use crate::status::StatusEngine;
use opsdesk_common::text::slugify;
use opsdesk_common::types::{CompanyId, EventType, Page, Pagination, TicketId, UserId};
use opsdesk_common::{Error, Result};
use opsdesk_storage::models::{Ticket, TicketReply, TicketWatcher};
use opsdesk_storage::repository::{
    CreateTicket, ListTicketsFilter, NewAuditEntry, TicketPatch, TicketRepository,
};
use serde_json::{json, Value};
use std::sync::Arc;

const SUBJECT_MAX_LEN: usize = 255;

/// Input for creating a ticket
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub subject: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub module_slug: Option<String>,
    pub external_provider: Option<String>,
    pub external_reference: Option<String>,
    pub company_id: Option<CompanyId>,
    pub requester_id: Option<UserId>,
    pub assigned_user_id: Option<UserId>,
}

/// Sparse ticket update. `None` leaves a field untouched; double-wrapped
/// fields distinguish "clear" from "leave alone".
#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
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
}

/// Ticket lifecycle service
#[derive(Clone)]
pub struct TicketService {
    tickets: TicketRepository,
    statuses: StatusEngine,
    sanitizer: Arc<dyn Sanitizer>,
    audit: Arc<dyn AuditRecorder>,
    bus: EventBus,
}

impl TicketService {
    /// Wire the service together
    pub fn new(
        tickets: TicketRepository,
        statuses: StatusEngine,
        sanitizer: Arc<dyn Sanitizer>,
        audit: Arc<dyn AuditRecorder>,
        bus: EventBus,
    ) -> Self {
        Self {
            tickets,
            statuses,
            sanitizer,
            audit,
            bus,
        }
    }

    /// The status engine backing this service
    pub fn statuses(&self) -> &StatusEngine {
        &self.statuses
    }

    /// Create a ticket. A null/empty status resolves to the catalog
    /// default; priority defaults to `normal`; a terminal initial status
    /// sets `closed_at` immediately.
    pub async fn create(&self, input: NewTicket, actor: Option<Actor>) -> Result<Ticket> {
        let subject = validate_subject(&input.subject)?;
        let status = self
            .statuses
            .resolve_status_or_default(input.status.as_deref())
            .await?;
        let priority = normalize_priority(input.priority.as_deref())?;

        let closed_at = if self.statuses.is_terminal(&status) {
            Some(chrono::Utc::now())
        } else {
            None
        };

        let ticket = self
            .tickets
            .create(CreateTicket {
                subject,
                description: input.description,
                status,
                priority,
                category: input.category,
                module_slug: input.module_slug,
                external_provider: input.external_provider,
                external_reference: input.external_reference,
                company_id: input.company_id,
                requester_id: input.requester_id,
                assigned_user_id: input.assigned_user_id,
                closed_at,
            })
            .await?;

        self.audit
            .record(NewAuditEntry {
                user_id: actor.as_ref().and_then(|a| a.user_id),
                action: "ticket.create".to_string(),
                entity_type: Some("ticket".to_string()),
                entity_id: Some(ticket.id.to_string()),
                new_value: serde_json::to_value(&ticket).ok(),
                api_key_id: actor.as_ref().and_then(|a| a.api_key_id),
                ..Default::default()
            })
            .await;

        self.bus.publish(Event::new(
            EventType::TicketCreated,
            "ticket",
            ticket.id.to_string(),
            ticket_payload(&ticket),
            actor,
        ));

        Ok(ticket)
    }

    /// Fetch a ticket
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        self.tickets
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ticket {} not found", id)))
    }

    /// List tickets with filters and pagination
    pub async fn list(&self, filter: &ListTicketsFilter, page: Pagination) -> Result<Page<Ticket>> {
        self.tickets.list(filter, page).await
    }

    /// Apply a sparse update. Status changes round-trip the status engine:
    /// entering a terminal status sets `closed_at`, leaving one clears it.
    pub async fn update(
        &self,
        id: TicketId,
        update: TicketUpdate,
        actor: Option<Actor>,
    ) -> Result<Ticket> {
        let existing = self.get(id).await?;
        let mut patch = TicketPatch::default();
        let mut changes: Vec<&'static str> = Vec::new();

        if let Some(subject) = update.subject {
            patch.subject = Some(validate_subject(&subject)?);
            changes.push("subject");
        }
        if let Some(description) = update.description {
            patch.description = Some(description);
            changes.push("description");
        }
        if let Some(raw_status) = update.status {
            let slug = self.statuses.validate_status_choice(&raw_status).await?;
            patch.closed_at = self
                .statuses
                .closed_at_for_transition(&slug, existing.closed_at);
            if slug != existing.status {
                changes.push("status");
            }
            patch.status = Some(slug);
        }
        if let Some(priority) = update.priority {
            patch.priority = Some(normalize_priority(Some(&priority))?);
            changes.push("priority");
        }
        if let Some(category) = update.category {
            patch.category = Some(category);
            changes.push("category");
        }
        if let Some(module_slug) = update.module_slug {
            patch.module_slug = Some(module_slug);
            changes.push("module_slug");
        }
        if let Some(assignee) = update.assigned_user_id {
            patch.assigned_user_id = Some(assignee);
            changes.push("assigned_user_id");
        }
        if let Some(summary) = update.ai_summary {
            patch.ai_summary = Some(summary);
            changes.push("ai_summary");
        }
        if let Some(summary_status) = update.ai_summary_status {
            patch.ai_summary_status = Some(summary_status);
            changes.push("ai_summary_status");
        }
        if let Some(tags) = update.ai_tags {
            patch.ai_tags = Some(dedup_tags(tags));
            changes.push("ai_tags");
        }

        if patch.is_empty() {
            return Ok(existing);
        }

        let updated = self.tickets.update(id, &patch).await?;

        self.audit
            .record(NewAuditEntry {
                user_id: actor.as_ref().and_then(|a| a.user_id),
                action: "ticket.update".to_string(),
                entity_type: Some("ticket".to_string()),
                entity_id: Some(updated.id.to_string()),
                previous_value: serde_json::to_value(&existing).ok(),
                new_value: serde_json::to_value(&updated).ok(),
                api_key_id: actor.as_ref().and_then(|a| a.api_key_id),
                ..Default::default()
            })
            .await;

        let mut payload = ticket_payload(&updated);
        payload["changes"] = json!(changes);
        payload["previous_status"] = json!(existing.status);

        self.bus.publish(Event::new(
            EventType::TicketUpdated,
            "ticket",
            updated.id.to_string(),
            payload,
            actor,
        ));

        Ok(updated)
    }

    /// Add a reply. The body passes through the sanitizer and is rejected
    /// when nothing visible survives; the parent's `updated_at` advances
    /// but a reply never reopens a ticket.
    pub async fn add_reply(
        &self,
        ticket_id: TicketId,
        author_id: Option<UserId>,
        body: &str,
        is_internal: bool,
        actor: Option<Actor>,
    ) -> Result<TicketReply> {
        let sanitized = self.sanitizer.sanitize(body);
        if sanitized.text.is_empty() && !sanitized.has_media {
            return Err(Error::InvalidInput(
                "Reply body is empty after sanitization".to_string(),
            ));
        }

        let ticket = self.get(ticket_id).await?;
        let reply = self
            .tickets
            .add_reply(ticket_id, author_id, &sanitized.text, is_internal)
            .await?;

        self.audit
            .record(NewAuditEntry {
                user_id: actor.as_ref().and_then(|a| a.user_id),
                action: "ticket.reply".to_string(),
                entity_type: Some("ticket".to_string()),
                entity_id: Some(ticket_id.to_string()),
                new_value: serde_json::to_value(&reply).ok(),
                api_key_id: actor.as_ref().and_then(|a| a.api_key_id),
                ..Default::default()
            })
            .await;

        let mut payload = ticket_payload(&ticket);
        payload["reply"] = serde_json::to_value(&reply).unwrap_or(Value::Null);
        payload["reply_id"] = json!(reply.id);
        payload["is_internal"] = json!(is_internal);

        self.bus.publish(Event::new(
            EventType::TicketReplyAdded,
            "ticket",
            ticket_id.to_string(),
            payload,
            actor,
        ));

        Ok(reply)
    }

    /// Replies for a ticket; internal replies are filtered out for callers
    /// without technician authority.
    pub async fn list_replies(
        &self,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketReply>> {
        self.get(ticket_id).await?;
        self.tickets.list_replies(ticket_id, include_internal).await
    }

    /// Subscribe a user to ticket activity. Re-adding is a no-op success
    /// and publishes no event.
    pub async fn add_watcher(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        actor: Option<Actor>,
    ) -> Result<()> {
        let inserted = self.tickets.add_watcher(ticket_id, user_id).await?;
        if !inserted {
            return Ok(());
        }

        let ticket = self.get(ticket_id).await?;
        let mut payload = ticket_payload(&ticket);
        payload["watcher_user_id"] = json!(user_id);

        self.bus.publish(Event::new(
            EventType::TicketWatcherAdded,
            "ticket",
            ticket_id.to_string(),
            payload,
            actor,
        ));

        Ok(())
    }

    /// Unsubscribe a user. Removing an absent watcher succeeds silently
    /// and publishes no event.
    pub async fn remove_watcher(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        actor: Option<Actor>,
    ) -> Result<()> {
        let removed = self.tickets.remove_watcher(ticket_id, user_id).await?;
        if !removed {
            return Ok(());
        }

        let ticket = self.get(ticket_id).await?;
        let mut payload = ticket_payload(&ticket);
        payload["watcher_user_id"] = json!(user_id);

        self.bus.publish(Event::new(
            EventType::TicketWatcherRemoved,
            "ticket",
            ticket_id.to_string(),
            payload,
            actor,
        ));

        Ok(())
    }

    /// Watchers for a ticket, ordered by subscription time
    pub async fn list_watchers(&self, ticket_id: TicketId) -> Result<Vec<TicketWatcher>> {
        self.get(ticket_id).await?;
        self.tickets.list_watchers(ticket_id).await
    }
}

/// Event payload: the full ticket under `ticket`, plus the fields rules
/// and templates most often match on lifted to the top level.
fn ticket_payload(ticket: &Ticket) -> Value {
    json!({
        "ticket": ticket,
        "ticket_id": ticket.id,
        "subject": ticket.subject,
        "status": ticket.status,
        "priority": ticket.priority,
        "company_id": ticket.company_id,
        "requester_id": ticket.requester_id,
        "assigned_user_id": ticket.assigned_user_id,
        "ai_tags": ticket.ai_tags_vec(),
    })
}

fn validate_subject(raw: &str) -> Result<String> {
    let subject = raw.trim();
    if subject.is_empty() {
        return Err(Error::InvalidInput("Subject is required".to_string()));
    }
    if subject.chars().count() > SUBJECT_MAX_LEN {
        return Err(Error::InvalidInput(format!(
            "Subject exceeds {} characters",
            SUBJECT_MAX_LEN
        )));
    }
    Ok(subject.to_string())
}

fn normalize_priority(raw: Option<&str>) -> Result<String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok("normal".to_string()),
        Some(value) => {
            let slug = slugify(value);
            if slug.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "'{}' is not a valid priority",
                    value
                )));
            }
            Ok(slug)
        }
    }
}

/// Deduplicate tags keeping the order of first appearance
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_subject() {
        assert_eq!(validate_subject("  Printer down  ").unwrap(), "Printer down");
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject(&"x".repeat(256)).is_err());
        assert_eq!(validate_subject(&"x".repeat(255)).unwrap().len(), 255);
    }

    #[test]
    fn test_normalize_priority() {
        assert_eq!(normalize_priority(None).unwrap(), "normal");
        assert_eq!(normalize_priority(Some("")).unwrap(), "normal");
        assert_eq!(normalize_priority(Some("High")).unwrap(), "high");
        assert_eq!(normalize_priority(Some("P1 / Urgent")).unwrap(), "p1_urgent");
        assert!(normalize_priority(Some("---")).is_err());
    }

    #[test]
    fn test_dedup_tags_keeps_first_appearance_order() {
        let tags = vec![
            "vpn".to_string(),
            "network".to_string(),
            "vpn".to_string(),
            "printer".to_string(),
            "network".to_string(),
        ];
        assert_eq!(dedup_tags(tags), vec!["vpn", "network", "printer"]);
    }
}
