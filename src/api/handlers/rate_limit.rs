//! Rate limiting primitives for attribute mutations.
//!
//! Limits are tracked per client IP and action in a fixed window. A request
//! without a resolvable IP is counted under a shared `unknown` key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::error;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    RequestUpdate,
    Confirm,
    ResendCode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    hits: u32,
}

/// In-process fixed-window limiter; counts are not shared between instances.
#[derive(Debug)]
pub struct WindowRateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<(String, RateLimitAction), Window>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        let Ok(mut windows) = self.windows.lock() else {
            error!("Rate limiter state poisoned");
            return RateLimitDecision::Limited; // Fail closed
        };

        let now = Instant::now();
        windows.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let key = (ip.unwrap_or(UNKNOWN_CLIENT).to_string(), action);
        let window = windows.entry(key).or_insert(Window {
            started_at: now,
            hits: 0,
        });
        if window.hits >= self.limit {
            return RateLimitDecision::Limited;
        }
        window.hits += 1;
        RateLimitDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::RequestUpdate),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Confirm),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_rate_limiter_limits_per_ip_and_action() {
        let limiter = WindowRateLimiter::per_minute(2);
        let ip = Some("1.2.3.4");

        assert_eq!(
            limiter.check_ip(ip, RateLimitAction::Confirm),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(ip, RateLimitAction::Confirm),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(ip, RateLimitAction::Confirm),
            RateLimitDecision::Limited
        );

        assert_eq!(
            limiter.check_ip(ip, RateLimitAction::ResendCode),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("5.6.7.8"), RateLimitAction::Confirm),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_rate_limiter_resets_after_window() {
        let limiter = WindowRateLimiter::new(1, Duration::ZERO);
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::RequestUpdate),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::RequestUpdate),
            RateLimitDecision::Allowed
        );
    }
}
