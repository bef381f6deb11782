//! Per-tool call limits
//!
//! Sliding-window limiter keyed by tool name. Tools that declare a
//! `rate_limit` in their definition get one window per tool.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[cfg(test)]
mod tests;

/// Limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum calls allowed in the window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

impl RateLimitConfig {
    /// Create a new config
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Calls per second
    #[must_use]
    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// Calls per minute
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

/// Outcome of an acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Calls left in the current window
    pub remaining: u32,
    /// Time until the oldest call leaves the window
    pub reset_after: Duration,
}

/// Sliding-window rate limiter
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record one call for `key` under `config`
    pub async fn acquire(&self, key: &str, config: RateLimitConfig) -> RateLimitResult {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let calls = windows.entry(key.to_string()).or_default();

        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= config.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        let reset_after = calls
            .front()
            .map(|oldest| config.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO);

        if (calls.len() as u32) < config.max_requests {
            calls.push_back(now);
            RateLimitResult {
                allowed: true,
                remaining: config.max_requests - calls.len() as u32,
                reset_after,
            }
        } else {
            RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after,
            }
        }
    }

    /// Calls currently inside the window for `key`
    pub async fn usage(&self, key: &str, config: RateLimitConfig) -> u32 {
        let now = Instant::now();
        let windows = self.windows.lock().await;
        windows
            .get(key)
            .map(|calls| {
                calls
                    .iter()
                    .filter(|t| now.duration_since(**t) < config.window)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Forget all history for `key`
    pub async fn reset(&self, key: &str) {
        self.windows.lock().await.remove(key);
    }
}
