//! opsdesk Core - Ticket lifecycle engine
//!
//! This crate carries the domain machinery over the storage layer: the
//! status engine, the in-process event bus, the automation engine, the
//! notification dispatcher, the permission guard, and their shared
//! collaborators (module registry, channels, sanitizer, audit recorder,
//! rate limiter).

pub mod audit;
pub mod automation;
pub mod bus;
pub mod channels;
pub mod guard;
pub mod modules;
pub mod notify;
pub mod rate_limit;
pub mod sanitize;
pub mod status;
pub mod tickets;

pub use audit::{AuditRecorder, DbAuditRecorder};
pub use automation::AutomationEngine;
pub use bus::{Actor, Event, EventBus, EventBusBuilder, EventSubscriber};
pub use channels::{EmailChannel, SmsChannel};
pub use guard::{PermissionGuard, ResolvedPermissions};
pub use modules::{ModuleContext, ModuleHandler, ModuleRegistry, ModuleRegistryBuilder};
pub use notify::NotificationDispatcher;
pub use rate_limit::RateLimiter;
pub use sanitize::{Sanitized, Sanitizer, TagStrippingSanitizer};
pub use status::{IncomingStatus, StatusEngine};
pub use tickets::{NewTicket, TicketService, TicketUpdate};
