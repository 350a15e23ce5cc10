//! Notification dispatch
//!
//! The dispatcher subscribes to the event bus and fans out to in-app
//! rows, email, and SMS per the event catalog and per-user preferences.
//! `dedup` bounds replays of the same (event, entity, user) inside a
//! sliding window.

pub mod dedup;
pub mod dispatcher;

pub use dedup::DedupWindow;
pub use dispatcher::NotificationDispatcher;
