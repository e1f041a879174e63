//! Per-instance fixed-window rate limiting for the checkout endpoint

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::core::service::{RateDecision, RateLimiter};

/// Key used when a request carries no client address header
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counter map kept in process memory
///
/// Counts are not shared between instances. When more than
/// `max_tracked_clients` keys are tracked, expired windows are dropped, and if
/// that is not enough the whole map is cleared.
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    max_tracked_clients: usize,
    windows: RwLock<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_tracked_clients: usize) -> Self {
        Self {
            max_requests,
            window,
            max_tracked_clients,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            config.max_tracked_clients,
        )
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.read().map(|w| w.len()).unwrap_or(0)
    }

    /// Count a request for `key` as if it arrived at `now`
    pub fn check_at(&self, key: &str, now: Instant) -> Result<RateDecision> {
        let mut windows = self
            .windows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if windows.len() >= self.max_tracked_clients && !windows.contains_key(key) {
            windows.retain(|_, w| now.duration_since(w.started) < self.window);
            if windows.len() >= self.max_tracked_clients {
                tracing::debug!(tracked = windows.len(), "rate limiter map cleared");
                windows.clear();
            }
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            let remaining = self.window.saturating_sub(elapsed);
            // round up so clients never retry a moment too early
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Ok(RateDecision::Limited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        entry.count += 1;
        Ok(RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        })
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision> {
        self.check_at(key, Instant::now())
    }
}

/// Client address used as rate-limit key
///
/// First entry of `x-forwarded-for`, then `x-real-ip`, then
/// [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
