//! Outbound notification channels
//!
//! Email goes through an SMTP relay (lettre); SMS through a configured
//! HTTP gateway. Both wrap low-level failures into `AdapterFailure` so the
//! dispatcher can log-and-continue per recipient. Delivered email is
//! registered with the tracking subsystem so opens and clicks can be
//! attributed later.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use opsdesk_common::config::{SmsConfig, SmtpConfig};
use opsdesk_common::types::CompanyId;
use opsdesk_common::{Error, Result};
use opsdesk_storage::repository::TrackingRepository;
use std::time::Duration;
use tracing::{debug, warn};

/// SMTP-backed email channel
pub struct EmailChannel {
    config: SmtpConfig,
    tracking: TrackingRepository,
}

impl EmailChannel {
    /// Create a channel over the configured relay
    pub fn new(config: SmtpConfig, tracking: TrackingRepository) -> Self {
        Self { config, tracking }
    }

    /// Send one notification email and register it for tracking
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        company_id: Option<CompanyId>,
    ) -> Result<()> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| Error::AdapterFailure(format!("Invalid from address: {}", e)))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| Error::AdapterFailure(format!("Invalid recipient '{}': {}", to, e)))?;

        let email = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::AdapterFailure(format!("Failed to build email: {}", e)))?;

        let transport = if self.config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| Error::AdapterFailure(format!("SMTP transport error: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };

        let mut transport = transport.port(self.config.port);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = transport.timeout(Some(Duration::from_secs(30))).build();

        mailer
            .send(email)
            .await
            .map_err(|e| Error::AdapterFailure(format!("SMTP send failed: {}", e)))?;

        debug!(to, subject, "Notification email sent");

        // Tracking registration is best-effort; the mail is already out.
        if let Err(e) = self
            .tracking
            .create_send(company_id, to, Some(subject))
            .await
        {
            warn!(to, "Failed to register tracked send: {}", e);
        }

        Ok(())
    }
}

/// HTTP-gateway SMS channel. Delivery is disabled when no endpoint is
/// configured; sends then succeed as no-ops.
pub struct SmsChannel {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsChannel {
    /// Create a channel over the configured gateway
    pub fn new(config: SmsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Send one SMS
    pub async fn send(&self, to: &str, message: &str) -> Result<()> {
        let Some(endpoint) = &self.config.endpoint else {
            debug!(to, "SMS channel disabled; message dropped");
            return Ok(());
        };

        let mut request = self.client.post(endpoint).json(&serde_json::json!({
            "to": to,
            "message": message,
        }));

        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::AdapterFailure(format!("SMS gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::AdapterFailure(format!(
                "SMS gateway returned status {}",
                response.status()
            )));
        }

        debug!(to, "Notification SMS sent");
        Ok(())
    }
}
