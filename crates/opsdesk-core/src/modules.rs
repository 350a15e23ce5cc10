//! Module handler registry
//!
//! Module actions are the side-effect handlers invoked by the automation
//! engine and the notification dispatcher. The registry is built at
//! startup and frozen. Handlers write through repositories and never
//! publish bus events, so a rule can never trigger itself or another rule
//! transitively.

use crate::status::StatusEngine;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use opsdesk_common::{template, Error, Result};
use opsdesk_storage::repository::{TicketPatch, TicketRepository};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Trigger context handed to a handler: the event payload for event-bound
/// invocations, or the rule's own identity for scheduled ones.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub trigger: Value,
}

/// A registered side-effect handler
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Registry key, matched against `action_module`
    fn name(&self) -> &'static str;

    /// Execute the action; the returned value lands in the run record
    async fn execute(&self, payload: &Value, ctx: &ModuleContext) -> Result<Value>;
}

/// Collects handlers before the registry freezes
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    handlers: HashMap<&'static str, Arc<dyn ModuleHandler>>,
}

impl ModuleRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name
    pub fn register(mut self, handler: Arc<dyn ModuleHandler>) -> Self {
        self.handlers.insert(handler.name(), handler);
        self
    }

    /// Freeze the registry
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable handler registry shared by automation and notifications
pub struct ModuleRegistry {
    handlers: HashMap<&'static str, Arc<dyn ModuleHandler>>,
}

impl ModuleRegistry {
    /// Dispatch to a handler by name
    pub async fn execute(&self, module: &str, payload: &Value, ctx: &ModuleContext) -> Result<Value> {
        let handler = self
            .handlers
            .get(module)
            .ok_or_else(|| Error::NotFound(format!("Unknown action module '{}'", module)))?;

        debug!(module, "Executing module action");
        handler.execute(payload, ctx).await
    }

    /// Registered module names, for validation on rule writes
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// POSTs the trigger context to an operator-configured URL.
///
/// Payload: `{"url": "...", "secret": "...", "data": {...}}`. `secret`
/// adds an `X-Webhook-Signature: sha256=<hmac>` header; `data` is
/// forwarded verbatim alongside the context.
pub struct WebhookModule {
    client: reqwest::Client,
}

impl WebhookModule {
    /// Create the handler with a request timeout
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl ModuleHandler for WebhookModule {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn execute(&self, payload: &Value, ctx: &ModuleContext) -> Result<Value> {
        let url = payload
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("Webhook action needs a 'url'".to_string()))?;

        validate_webhook_url(url)?;

        let body = serde_json::json!({
            "data": payload.get("data").cloned().unwrap_or(Value::Null),
            "context": ctx.trigger,
        });
        let body_bytes =
            serde_json::to_vec(&body).map_err(|e| Error::Internal(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(secret) = payload.get("secret").and_then(Value::as_str) {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;
            mac.update(&body_bytes);
            let signature = hex::encode(mac.finalize().into_bytes());
            request = request.header("X-Webhook-Signature", format!("sha256={}", signature));
        }

        let response = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| Error::AdapterFailure(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AdapterFailure(format!(
                "Webhook returned status {}",
                status
            )));
        }

        Ok(serde_json::json!({"status": status.as_u16()}))
    }
}

/// Sends a templated email. `to`, `subject`, and `body` are all rendered
/// against the trigger context.
pub struct EmailModule {
    channel: Arc<crate::channels::EmailChannel>,
}

impl EmailModule {
    pub fn new(channel: Arc<crate::channels::EmailChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ModuleHandler for EmailModule {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn execute(&self, payload: &Value, ctx: &ModuleContext) -> Result<Value> {
        let field = |name: &str| -> Result<String> {
            let raw = payload
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("Email action needs a '{}'", name))
                })?;
            Ok(template::render(raw, &ctx.trigger))
        };

        let to = field("to")?;
        let subject = field("subject")?;
        let body = field("body")?;

        self.channel.send(&to, &subject, &body, None).await?;
        Ok(serde_json::json!({"to": to}))
    }
}

/// Applies a sparse patch to a ticket.
///
/// Writes go straight through the repository; the status engine still
/// decides the `closed_at` transition so the terminal invariant holds, but
/// no bus event is published.
pub struct TicketUpdateModule {
    tickets: TicketRepository,
    statuses: StatusEngine,
}

impl TicketUpdateModule {
    pub fn new(tickets: TicketRepository, statuses: StatusEngine) -> Self {
        Self { tickets, statuses }
    }
}

#[async_trait]
impl ModuleHandler for TicketUpdateModule {
    fn name(&self) -> &'static str {
        "ticket_update"
    }

    async fn execute(&self, payload: &Value, ctx: &ModuleContext) -> Result<Value> {
        let ticket_id = payload
            .get("ticket_id")
            .or_else(|| ctx.trigger.get("ticket_id"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                Error::InvalidInput("Ticket update action needs a 'ticket_id'".to_string())
            })?;

        let ticket = self
            .tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ticket {} not found", ticket_id)))?;

        let mut patch = TicketPatch::default();

        if let Some(raw) = payload.get("status").and_then(Value::as_str) {
            let slug = self.statuses.validate_status_choice(raw).await?;
            patch.closed_at = self
                .statuses
                .closed_at_for_transition(&slug, ticket.closed_at);
            patch.status = Some(slug);
        }
        if let Some(priority) = payload.get("priority").and_then(Value::as_str) {
            patch.priority = Some(priority.to_string());
        }
        if let Some(assignee) = payload.get("assigned_user_id") {
            patch.assigned_user_id = match assignee {
                Value::Null => Some(None),
                Value::String(s) => Some(Some(Uuid::parse_str(s).map_err(|_| {
                    Error::InvalidInput("Invalid 'assigned_user_id'".to_string())
                })?)),
                _ => None,
            };
        }

        if patch.is_empty() {
            return Ok(serde_json::json!({"ticket_id": ticket_id, "changed": false}));
        }

        let updated = self.tickets.update(ticket_id, &patch).await?;
        Ok(serde_json::json!({
            "ticket_id": updated.id,
            "status": updated.status,
            "changed": true,
        }))
    }
}

/// Reject URLs that would let an operator-authored action reach internal
/// addresses: non-HTTP schemes, obvious internal hostnames, and private or
/// reserved IP ranges.
fn validate_webhook_url(url_str: &str) -> Result<()> {
    let url = reqwest::Url::parse(url_str)
        .map_err(|e| Error::InvalidInput(format!("Invalid webhook URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::InvalidInput(format!(
                "Webhook URL scheme '{}' is not allowed",
                scheme
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidInput("Webhook URL has no host".to_string()))?;

    let lower_host = host.to_lowercase();
    if lower_host == "localhost"
        || lower_host.ends_with(".local")
        || lower_host.ends_with(".internal")
        || lower_host == "metadata.google.internal"
        || lower_host == "169.254.169.254"
    {
        return Err(Error::InvalidInput(format!(
            "Webhook URL host '{}' is not allowed",
            host
        )));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(Error::InvalidInput(format!(
                "Webhook URL IP '{}' is not allowed",
                ip
            )));
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || (ipv4.octets()[0] == 100 && (ipv4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || (ipv6.segments()[0] & 0xfe00) == 0xfc00
                || (ipv6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_url_validation() {
        assert!(validate_webhook_url("https://hooks.example.com/x").is_ok());
        assert!(validate_webhook_url("http://example.com:8443/cb").is_ok());

        assert!(validate_webhook_url("ftp://example.com/x").is_err());
        assert!(validate_webhook_url("https://localhost/x").is_err());
        assert!(validate_webhook_url("https://db.internal/x").is_err());
        assert!(validate_webhook_url("http://127.0.0.1/x").is_err());
        assert!(validate_webhook_url("http://10.1.2.3/x").is_err());
        assert!(validate_webhook_url("http://192.168.0.10/x").is_err());
        assert!(validate_webhook_url("http://169.254.169.254/meta").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[test]
    fn test_registry_dispatch_unknown_module() {
        let registry = ModuleRegistryBuilder::new().build();
        let ctx = ModuleContext {
            trigger: serde_json::json!({}),
        };

        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(registry.execute("nope", &serde_json::json!({}), &ctx));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
