//! Repository layer for data access

pub mod api_keys;
pub mod audit;
pub mod automation;
pub mod companies;
pub mod custom_fields;
pub mod notifications;
pub mod sessions;
pub mod statuses;
pub mod tickets;
pub mod tracking;
pub mod users;

pub use api_keys::ApiKeyRepository;
pub use audit::{AuditRepository, NewAuditEntry};
pub use automation::{AutomationRepository, CreateRule, NewRun, RulePatch};
pub use companies::CompanyRepository;
pub use custom_fields::{CustomFieldRepository, UpsertCustomField};
pub use notifications::NotificationRepository;
pub use sessions::SessionRepository;
pub use statuses::{StatusDefinition, StatusRepository};
pub use tickets::{CreateTicket, ListTicketsFilter, TicketPatch, TicketRepository};
pub use tracking::TrackingRepository;
pub use users::{CreateUser, MembershipGrant, UserRepository};

use opsdesk_common::Error;

/// Map an insert error, surfacing unique violations as `Conflict`.
pub(crate) fn map_write_err(e: sqlx::Error) -> Error {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return Error::Conflict(db_err.message().to_string());
        }
    }
    Error::Database(e.to_string())
}
