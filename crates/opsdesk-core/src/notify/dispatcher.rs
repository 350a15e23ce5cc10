//! Notification dispatcher
//!
//! For every bus event with a catalog entry: render the message template
//! against the event payload, resolve the recipient set, and fan out per
//! recipient×channel where the catalog allows the channel and the user's
//! preference (or the catalog default) enables it. Per-recipient channel
//! failures are logged and skipped so one bad address cannot block an
//! event. Configured module actions fire through the shared registry.

use crate::bus::{Event, EventSubscriber};
use crate::channels::{EmailChannel, SmsChannel};
use crate::modules::{ModuleContext, ModuleRegistry};
use crate::notify::dedup::{DedupKey, DedupWindow};
use async_trait::async_trait;
use opsdesk_common::config::NotificationConfig;
use opsdesk_common::template;
use opsdesk_common::types::{Channel, CompanyId, UserId};
use opsdesk_storage::models::{NotificationEventSetting, NotificationPreference, User};
use opsdesk_storage::repository::{NotificationRepository, TicketRepository, UserRepository};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-user channel switches after merging catalog defaults with the
/// stored preference row
struct ChannelPlan {
    in_app: bool,
    email: bool,
    sms: bool,
}

fn plan_for(
    setting: &NotificationEventSetting,
    pref: Option<&NotificationPreference>,
) -> ChannelPlan {
    ChannelPlan {
        in_app: setting.allow_in_app && pref.map(|p| p.in_app).unwrap_or(setting.default_in_app),
        email: setting.allow_email && pref.map(|p| p.email).unwrap_or(setting.default_email),
        sms: setting.allow_sms && pref.map(|p| p.sms).unwrap_or(setting.default_sms),
    }
}

/// Event-bus subscriber fanning out notifications
pub struct NotificationDispatcher {
    notifications: NotificationRepository,
    tickets: TicketRepository,
    users: UserRepository,
    email: Arc<EmailChannel>,
    sms: Arc<SmsChannel>,
    modules: Arc<ModuleRegistry>,
    dedup: DedupWindow,
}

impl NotificationDispatcher {
    /// Wire the dispatcher together
    pub fn new(
        notifications: NotificationRepository,
        tickets: TicketRepository,
        users: UserRepository,
        email: Arc<EmailChannel>,
        sms: Arc<SmsChannel>,
        modules: Arc<ModuleRegistry>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            notifications,
            tickets,
            users,
            email,
            sms,
            modules,
            dedup: DedupWindow::new(config.dedup_window_secs),
        }
    }

    fn metadata(event: &Event) -> Value {
        json!({
            "event_type": event.event_type.as_str(),
            "entity_type": event.entity_type,
            "entity_id": event.entity_id,
        })
    }

    fn dedup_key(event: &Event, user_id: Option<UserId>) -> DedupKey {
        DedupKey {
            event_type: event.event_type.as_str().to_string(),
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.clone(),
            user_id,
        }
    }

    async fn dispatch_broadcast(
        &self,
        event: &Event,
        setting: &NotificationEventSetting,
        message: &str,
    ) {
        if !setting.allow_in_app {
            return;
        }
        if !self.dedup.first_within_window(Self::dedup_key(event, None)) {
            debug!(event = %event.event_type, "Broadcast suppressed by dedup window");
            return;
        }

        if let Err(e) = self
            .notifications
            .insert(None, event.event_type.as_str(), message, &Self::metadata(event))
            .await
        {
            warn!(event = %event.event_type, "Failed to write broadcast row: {}", e);
        }
    }

    /// Candidate recipients in resolution order: watchers, requester,
    /// assignee, company admins. Order of first appearance is kept.
    async fn resolve_recipients(&self, event: &Event) -> Vec<UserId> {
        let mut ordered: Vec<UserId> = Vec::new();
        let mut seen: HashSet<UserId> = HashSet::new();

        if event.entity_type == "ticket" {
            if let Ok(ticket_id) = Uuid::parse_str(&event.entity_id) {
                match self.tickets.list_watchers(ticket_id).await {
                    Ok(watchers) => {
                        for watcher in watchers {
                            if seen.insert(watcher.user_id) {
                                ordered.push(watcher.user_id);
                            }
                        }
                    }
                    Err(e) => warn!(%ticket_id, "Failed to load watchers: {}", e),
                }
            }
        }

        for field in ["requester_id", "assigned_user_id"] {
            if let Some(id) = event
                .payload
                .get(field)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                if seen.insert(id) {
                    ordered.push(id);
                }
            }
        }

        if let Some(company_id) = event
            .payload
            .get("company_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            match self.users.company_admins(company_id).await {
                Ok(admins) => {
                    for admin in admins {
                        if seen.insert(admin.id) {
                            ordered.push(admin.id);
                        }
                    }
                }
                Err(e) => warn!(%company_id, "Failed to load company admins: {}", e),
            }
        }

        ordered
    }

    async fn dispatch_targeted(
        &self,
        event: &Event,
        setting: &NotificationEventSetting,
        message: &str,
    ) {
        let recipient_ids = self.resolve_recipients(event).await;
        if recipient_ids.is_empty() {
            debug!(event = %event.event_type, "No recipients resolved");
            return;
        }

        let users: HashMap<UserId, User> = match self.users.get_many(&recipient_ids).await {
            Ok(users) => users.into_iter().map(|u| (u.id, u)).collect(),
            Err(e) => {
                warn!("Failed to load recipients: {}", e);
                return;
            }
        };

        let prefs: HashMap<UserId, NotificationPreference> = match self
            .notifications
            .get_preferences(&recipient_ids, event.event_type.as_str())
            .await
        {
            Ok(prefs) => prefs.into_iter().map(|p| (p.user_id, p)).collect(),
            Err(e) => {
                warn!("Failed to load preferences: {}", e);
                HashMap::new()
            }
        };

        let company_id: Option<CompanyId> = event
            .payload
            .get("company_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());

        for user_id in recipient_ids {
            let Some(user) = users.get(&user_id).filter(|u| u.active) else {
                continue;
            };
            let plan = plan_for(setting, prefs.get(&user_id));

            if plan.in_app {
                if self
                    .dedup
                    .first_within_window(Self::dedup_key(event, Some(user_id)))
                {
                    if let Err(e) = self
                        .notifications
                        .insert(
                            Some(user_id),
                            event.event_type.as_str(),
                            message,
                            &Self::metadata(event),
                        )
                        .await
                    {
                        warn!(%user_id, "Failed to write notification row: {}", e);
                    }
                } else {
                    debug!(%user_id, event = %event.event_type, "In-app row suppressed by dedup window");
                }
            }

            if plan.email {
                if let Err(e) = self
                    .email
                    .send(&user.email, &setting.display_name, message, company_id)
                    .await
                {
                    warn!(%user_id, channel = %Channel::Email, "Delivery failed: {}", e);
                }
            }

            if plan.sms {
                match &user.phone {
                    Some(phone) => {
                        if let Err(e) = self.sms.send(phone, message).await {
                            warn!(%user_id, channel = %Channel::Sms, "Delivery failed: {}", e);
                        }
                    }
                    None => debug!(%user_id, "SMS enabled but user has no phone"),
                }
            }
        }
    }

    async fn fire_module_actions(&self, event: &Event, setting: &NotificationEventSetting) {
        let ctx = ModuleContext {
            trigger: event.payload.clone(),
        };

        for action in setting.module_actions_vec() {
            if let Err(e) = self.modules.execute(&action.module, &action.payload, &ctx).await {
                warn!(
                    module = %action.module,
                    event = %event.event_type,
                    "Notification module action failed: {}",
                    e
                );
            }
        }
    }
}

#[async_trait]
impl EventSubscriber for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(setting) = self
            .notifications
            .get_setting(event.event_type.as_str())
            .await?
        else {
            debug!(event = %event.event_type, "No catalog entry; event ignored");
            return Ok(());
        };

        let message = template::render(&setting.message_template, &event.payload);

        if setting.broadcast {
            self.dispatch_broadcast(event, &setting, &message).await;
        } else {
            self.dispatch_targeted(event, &setting, &message).await;
        }

        self.fire_module_actions(event, &setting).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(allow: (bool, bool, bool), default: (bool, bool, bool)) -> NotificationEventSetting {
        NotificationEventSetting {
            event_type: "ticket.created".to_string(),
            display_name: "Ticket created".to_string(),
            description: None,
            message_template: "{{subject}}".to_string(),
            user_visible: true,
            broadcast: false,
            allow_in_app: allow.0,
            allow_email: allow.1,
            allow_sms: allow.2,
            default_in_app: default.0,
            default_email: default.1,
            default_sms: default.2,
            module_actions: serde_json::json!([]),
        }
    }

    fn pref(in_app: bool, email: bool, sms: bool) -> NotificationPreference {
        NotificationPreference {
            user_id: Uuid::new_v4(),
            event_type: "ticket.created".to_string(),
            in_app,
            email,
            sms,
        }
    }

    #[test]
    fn test_missing_preference_falls_back_to_catalog_default() {
        let plan = plan_for(&setting((true, true, true), (true, false, false)), None);
        assert!(plan.in_app);
        assert!(!plan.email);
        assert!(!plan.sms);
    }

    #[test]
    fn test_preference_overrides_default() {
        let plan = plan_for(
            &setting((true, true, true), (true, false, false)),
            Some(&pref(false, true, true)),
        );
        assert!(!plan.in_app);
        assert!(plan.email);
        assert!(plan.sms);
    }

    #[test]
    fn test_catalog_disallow_wins_over_preference() {
        let plan = plan_for(
            &setting((true, false, false), (true, true, true)),
            Some(&pref(true, true, true)),
        );
        assert!(plan.in_app);
        assert!(!plan.email);
        assert!(!plan.sms);
    }
}
