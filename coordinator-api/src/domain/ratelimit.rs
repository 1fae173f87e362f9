// This file is part of lm-coordinator.
// Copyright (C) 2025 LM Coordinator Contributors
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Requests per minute allowed per client IP.
pub const IP_LIMIT_PER_MINUTE: u32 = 30;

/// Requests per minute allowed per scoped key (`vote_<voter>`, `claim_<voter>`, `ping_<voter>`).
pub const KEY_LIMIT_PER_MINUTE: u32 = 5;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window in-memory rate limiter; per-key mutual exclusion comes from the concurrent map.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    fn with_window(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Count a request against `key`; when the limit is exhausted, the time until the window
    /// resets is returned.
    pub fn check(&self, key: &str, limit: u32) -> Result<(), Duration> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_owned()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if entry.reset_at <= now {
            *entry = Window {
                count: 0,
                reset_at: now + self.window,
            };
        }

        if entry.count >= limit {
            return Err(entry.reset_at.saturating_duration_since(now));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows whose reset time has passed; returns the number of dropped entries.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        before - self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_enforced_per_key() {
        let limiter = RateLimiter::new();

        for _ in 0..5 {
            assert!(limiter.check("vote_a", 5).is_ok());
        }
        assert!(limiter.check("vote_a", 5).is_err());
        // A different key has its own window.
        assert!(limiter.check("vote_b", 5).is_ok());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::with_window(Duration::from_millis(10));

        assert!(limiter.check("ip", 1).is_ok());
        assert!(limiter.check("ip", 1).is_err());

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("ip", 1).is_ok());
    }

    #[test]
    fn test_prune_drops_expired_windows() {
        let limiter = RateLimiter::with_window(Duration::from_millis(5));

        limiter.check("a", 5).expect("first request is admitted");
        limiter.check("b", 5).expect("first request is admitted");
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(limiter.prune(), 2);
        assert_eq!(limiter.prune(), 0);
    }
}
