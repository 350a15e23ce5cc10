//! Sliding dedup window for in-app notifications
//!
//! Replays of the same notification key inside the window must not create
//! duplicate rows. The window lives in process memory; entries are pruned
//! every Nth check so the map stays bounded.

use opsdesk_common::types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const PRUNE_INTERVAL: u64 = 256;

/// Identity of one delivered notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    /// `None` marks a broadcast row
    pub user_id: Option<UserId>,
}

/// In-process sliding window
pub struct DedupWindow {
    window: Duration,
    seen: Mutex<HashMap<DedupKey, Instant>>,
    check_count: AtomicU64,
}

impl DedupWindow {
    /// Create a window of the given width
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            seen: Mutex::new(HashMap::new()),
            check_count: AtomicU64::new(0),
        }
    }

    /// Record the key and report whether it is the first occurrence
    /// within the window.
    pub fn first_within_window(&self, key: DedupKey) -> bool {
        let now = Instant::now();

        let count = self.check_count.fetch_add(1, Ordering::Relaxed);
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if count % PRUNE_INTERVAL == 0 {
            let window = self.window;
            seen.retain(|_, stamp| now.duration_since(*stamp) < window);
        }

        match seen.get(&key) {
            Some(stamp) if now.duration_since(*stamp) < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key(event: &str, user: Option<UserId>) -> DedupKey {
        DedupKey {
            event_type: event.to_string(),
            entity_type: "ticket".to_string(),
            entity_id: "t1".to_string(),
            user_id: user,
        }
    }

    #[test]
    fn test_replay_suppressed_within_window() {
        let window = DedupWindow::new(60);
        let user = Some(Uuid::new_v4());

        assert!(window.first_within_window(key("ticket.created", user)));
        assert!(!window.first_within_window(key("ticket.created", user)));
    }

    #[test]
    fn test_distinct_users_are_independent() {
        let window = DedupWindow::new(60);
        let a = Some(Uuid::new_v4());
        let b = Some(Uuid::new_v4());

        assert!(window.first_within_window(key("ticket.created", a)));
        assert!(window.first_within_window(key("ticket.created", b)));
        assert!(window.first_within_window(key("ticket.created", None)));
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let window = DedupWindow::new(0);
        let user = Some(Uuid::new_v4());

        assert!(window.first_within_window(key("ticket.created", user)));
        assert!(window.first_within_window(key("ticket.created", user)));
    }
}
