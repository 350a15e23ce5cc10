//! In-memory sliding-window rate limiter
//!
//! Tracks request timestamps per key and rejects requests exceeding the
//! configured limit inside the window, with a `retry_after` hint. Memory is
//! bounded two ways: cleanup runs every Nth request to drop idle keys, and
//! a hard cap on tracked keys rejects new keys when full. A Redis-backed
//! variant for multi-process deployments would sit behind the same check
//! call; this tier is single-process.

use opsdesk_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests allowed per window per key
    pub max_requests: u32,
    /// Window size in seconds
    pub window_secs: u64,
    /// Run cleanup every N requests
    pub cleanup_interval: u64,
    /// Hard cap on tracked keys
    pub max_tracked_keys: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window_secs: 60,
            cleanup_interval: 100,
            max_tracked_keys: 10_000,
        }
    }
}

/// Sliding-window limiter keyed by an arbitrary string (principal or IP)
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: RwLock<HashMap<String, Vec<Instant>>>,
    request_count: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter with the given per-key budget
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self::with_config(RateLimiterConfig {
            max_requests,
            window_secs,
            ..Default::default()
        })
    }

    /// Create a limiter from a full configuration
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
            request_count: AtomicU64::new(0),
        }
    }

    /// Check and record a request for `key`.
    ///
    /// Returns `RateLimited` with a retry hint when the key has exhausted
    /// its window budget.
    pub fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);

        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count % self.config.cleanup_interval == 0 {
            self.cleanup(now, window);
        }

        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !state.contains_key(key) && state.len() >= self.config.max_tracked_keys {
            // Try to reclaim expired entries before refusing a new key
            state.retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < window));
            if state.len() >= self.config.max_tracked_keys {
                debug!(key, "Rate limiter key table full");
                return Err(Error::RateLimited {
                    retry_after_secs: self.config.window_secs,
                });
            }
        }

        let stamps = state.entry(key.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < window);

        if stamps.len() >= self.config.max_requests as usize {
            // The slot frees up when the oldest stamp leaves the window
            let oldest = stamps.iter().min().copied().unwrap_or(now);
            let retry_after = window
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(Error::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        stamps.push(now);
        Ok(())
    }

    fn cleanup(&self, now: Instant, window: Duration) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < window));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, 60);
        for _ in 0..3 {
            assert!(limiter.check("k").is_ok());
        }
        assert!(limiter.check("k").is_err());
    }

    #[test]
    fn test_rejection_carries_retry_hint() {
        let limiter = RateLimiter::new(1, 60);
        limiter.check("k").unwrap();

        match limiter.check("k") {
            Err(Error::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_key_table_cap() {
        let limiter = RateLimiter::with_config(RateLimiterConfig {
            max_requests: 10,
            window_secs: 60,
            cleanup_interval: 1_000,
            max_tracked_keys: 2,
        });

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        // Third distinct key cannot be tracked while the table is full
        assert!(limiter.check("c").is_err());
        // Existing keys still have budget
        assert!(limiter.check("a").is_ok());
    }
}
