//! opsdesk - Operations portal entry point

use anyhow::Result;
use opsdesk_api::{create_router, AppState};
use opsdesk_common::config::Config;
use opsdesk_core::{
    AutomationEngine, DbAuditRecorder, EmailChannel, EventBusBuilder, ModuleRegistryBuilder,
    NotificationDispatcher, PermissionGuard, RateLimiter, SmsChannel, StatusEngine,
    TagStrippingSanitizer, TicketService,
};
use opsdesk_core::modules::{EmailModule, TicketUpdateModule, WebhookModule};
use opsdesk_storage::db::DatabasePool;
use opsdesk_storage::models::{NotificationEventSetting, Role};
use opsdesk_storage::repository::{
    ApiKeyRepository, AuditRepository, AutomationRepository, CompanyRepository, CreateUser,
    CustomFieldRepository, NotificationRepository, SessionRepository, StatusRepository,
    TicketRepository, TrackingRepository, UserRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting opsdesk...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    // Repositories
    let tickets_repo = TicketRepository::new(db_pool.clone());
    let statuses_repo = StatusRepository::new(db_pool.clone());
    let users_repo = UserRepository::new(db_pool.clone());
    let companies_repo = CompanyRepository::new(db_pool.clone());
    let sessions_repo = SessionRepository::new(db_pool.clone());
    let api_keys_repo = ApiKeyRepository::new(db_pool.clone());
    let automation_repo = AutomationRepository::new(db_pool.clone());
    let notifications_repo = NotificationRepository::new(db_pool.clone());
    let custom_fields_repo = CustomFieldRepository::new(db_pool.clone());
    let tracking_repo = TrackingRepository::new(db_pool.clone());
    let audit_repo = AuditRepository::new(db_pool.clone());

    // Status engine and seed data
    let statuses = StatusEngine::new(statuses_repo, &config.tickets);
    statuses.ensure_defaults().await?;
    seed_roles(&users_repo).await?;
    seed_notification_catalog(&notifications_repo).await?;
    bootstrap_admin(&users_repo).await?;

    // Outbound channels
    let email_channel = Arc::new(EmailChannel::new(
        config.notifications.smtp.clone(),
        tracking_repo.clone(),
    ));
    let sms_channel = Arc::new(SmsChannel::new(config.notifications.sms.clone()));

    // Module handler registry, shared by automation and notifications
    let modules = Arc::new(
        ModuleRegistryBuilder::new()
            .register(Arc::new(WebhookModule::new(
                config.automation.webhook_timeout_secs,
            )))
            .register(Arc::new(EmailModule::new(email_channel.clone())))
            .register(Arc::new(TicketUpdateModule::new(
                tickets_repo.clone(),
                statuses.clone(),
            )))
            .build(),
    );

    // Bus subscribers
    let automation_engine = Arc::new(AutomationEngine::new(
        automation_repo.clone(),
        modules.clone(),
        config.automation.clone(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifications_repo.clone(),
        tickets_repo.clone(),
        users_repo.clone(),
        email_channel,
        sms_channel,
        modules.clone(),
        &config.notifications,
    ));

    let (bus, bus_handle) = EventBusBuilder::new()
        .subscribe(automation_engine.clone())
        .subscribe(dispatcher)
        .start();
    info!("Event bus started");

    // Ticket service over the bus
    let tickets = TicketService::new(
        tickets_repo,
        statuses.clone(),
        Arc::new(TagStrippingSanitizer),
        Arc::new(DbAuditRecorder::new(audit_repo.clone())),
        bus,
    );

    // Automation timers
    automation_engine.reload_schedules().await?;
    let scheduler_handle = tokio::spawn(automation_engine.clone().run_scheduler());

    // Rate limiters: one for the API surface, a stricter one for login
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max_requests,
        config.rate_limit.window_secs,
    ));
    let login_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.login_max_requests,
        config.rate_limit.login_window_secs,
    ));

    let bind_address = config.server.bind_address.clone();
    let port = config.api.port;

    let state = Arc::new(AppState {
        db_pool,
        config,
        tickets,
        statuses,
        guard: PermissionGuard::new(users_repo.clone()),
        modules,
        users: users_repo,
        sessions: sessions_repo,
        api_keys: api_keys_repo,
        companies: companies_repo,
        automation: automation_repo,
        notifications: notifications_repo,
        custom_fields: custom_fields_repo,
        tracking: tracking_repo,
        audit: audit_repo,
        limiter,
        login_limiter,
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_address, port)).await?;
    info!("API server listening on {}:{}", bind_address, port);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("opsdesk started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    scheduler_handle.abort();
    bus_handle.abort();

    info!("opsdesk shutdown complete");

    Ok(())
}

/// Stock roles. Upserts so permission additions reach existing deployments.
async fn seed_roles(users: &UserRepository) -> Result<()> {
    let roles = [
        Role {
            slug: "admin".to_string(),
            name: "Administrator".to_string(),
            permissions: serde_json::json!([
                "portal.access",
                "tickets.manage",
                "helpdesk.technician",
                "automation.manage",
                "settings.manage",
                "company.admin",
            ]),
        },
        Role {
            slug: "technician".to_string(),
            name: "Technician".to_string(),
            permissions: serde_json::json!([
                "portal.access",
                "tickets.manage",
                "helpdesk.technician",
            ]),
        },
        Role {
            slug: "member".to_string(),
            name: "Member".to_string(),
            permissions: serde_json::json!(["portal.access"]),
        },
    ];

    for role in &roles {
        users.upsert_role(role).await?;
    }

    Ok(())
}

/// Seed catalog entries for the core ticket events when the catalog is
/// empty. Operators adjust them through the settings surface afterwards.
async fn seed_notification_catalog(notifications: &NotificationRepository) -> Result<()> {
    if !notifications.list_settings().await?.is_empty() {
        return Ok(());
    }

    info!("Seeding notification event catalog");

    let entries = [
        (
            "ticket.created",
            "Ticket created",
            "New ticket: {{subject}}",
        ),
        (
            "ticket.updated",
            "Ticket updated",
            "Ticket '{{subject}}' is now {{status}}",
        ),
        (
            "ticket.reply_added",
            "Ticket reply",
            "New reply on '{{subject}}'",
        ),
    ];

    for (event_type, display_name, message_template) in entries {
        let setting = NotificationEventSetting {
            event_type: event_type.to_string(),
            display_name: display_name.to_string(),
            description: None,
            message_template: message_template.to_string(),
            user_visible: true,
            broadcast: false,
            allow_in_app: true,
            allow_email: true,
            allow_sms: false,
            default_in_app: true,
            default_email: false,
            default_sms: false,
            module_actions: serde_json::json!([]),
        };
        notifications.upsert_setting(&setting).await?;
    }

    Ok(())
}

/// Create the initial super admin when the user table is empty and the
/// bootstrap environment variables are present. The password arrives
/// pre-hashed so the plaintext never touches configuration.
async fn bootstrap_admin(users: &UserRepository) -> Result<()> {
    if users.count().await? > 0 {
        return Ok(());
    }

    let (Ok(email), Ok(password_hash)) = (
        std::env::var("OPSDESK_ADMIN_EMAIL"),
        std::env::var("OPSDESK_ADMIN_PASSWORD_HASH"),
    ) else {
        warn!("No users exist and no OPSDESK_ADMIN_* bootstrap variables are set");
        return Ok(());
    };

    let user = users
        .create(CreateUser {
            email,
            password_hash,
            name: Some("Administrator".to_string()),
            phone: None,
            is_super_admin: true,
        })
        .await?;

    info!(user = %user.id, "Bootstrap super admin created");
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,opsdesk=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
