//! Automation engine
//!
//! Rules are either scheduled (their own timer) or event-bound (fired by
//! matching bus events). Matching and next-run computation are pure;
//! `engine` owns execution, run recording, and overlap policy.

pub mod engine;
pub mod matcher;
pub mod schedule;

pub use engine::AutomationEngine;
pub use matcher::rule_matches;
pub use schedule::{next_run, ScheduleSpec};
