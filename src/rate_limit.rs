//! Fixed-window request rate limiting.
//!
//! Each identity gets a counter and a reset time. The first request opens a
//! window of `window_ms`; every request inside it increments the counter,
//! and once the counter exceeds `max_requests` requests are denied until the
//! window ends. Denied requests still count, so hammering does not shorten
//! the wait.
//!
//! Expired windows are evicted lazily on the next `check` for that
//! identity. [`RateLimiter::cleanup`] sweeps every expired record; the
//! server runs it every [`CLEANUP_INTERVAL`].
//!
//! The counter map sits behind a `Mutex`, so concurrent `check` calls for
//! the same identity never admit more than `max_requests` per window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const DENIAL_MESSAGE: &str = "Too many requests, please try again later";
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Window length and request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Named limits for common endpoint classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPreset {
    /// 100 requests per minute.
    Authenticated,
    /// 20 requests per minute.
    #[default]
    Unauthenticated,
    /// 10 requests per minute.
    Sensitive,
    /// 5 requests per minute.
    Strict,
}

impl RateLimitPreset {
    pub fn config(self) -> RateLimitConfig {
        let max_requests = match self {
            RateLimitPreset::Authenticated => 100,
            RateLimitPreset::Unauthenticated => 20,
            RateLimitPreset::Sensitive => 10,
            RateLimitPreset::Strict => 5,
        };
        RateLimitConfig {
            window_ms: 60_000,
            max_requests,
        }
    }
}

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u32,
    reset_time: i64,
}

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RateLimitError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitError {
    pub code: String,
    pub message: String,
    /// Seconds until the window ends, rounded up.
    pub retry_after: u64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    store: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            store: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_preset(preset: RateLimitPreset) -> Self {
        Self::new(preset.config())
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        // Records stay consistent across a panic; each update is a single assignment.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one request for `identity` and decide whether it is allowed.
    pub fn check(&self, identity: &str) -> RateLimitResult {
        let now = self.clock.now_ms();
        let limit = self.config.max_requests;
        let mut records = self.records();

        let record = records
            .entry(identity.to_string())
            .and_modify(|r| {
                if now >= r.reset_time {
                    *r = RateLimitRecord {
                        count: 0,
                        reset_time: now + self.config.window_ms as i64,
                    };
                }
                r.count = r.count.saturating_add(1);
            })
            .or_insert(RateLimitRecord {
                count: 1,
                reset_time: now + self.config.window_ms as i64,
            });

        if record.count > limit {
            let retry_after = (record.reset_time - now).max(0) as u64;
            tracing::debug!(identity, count = record.count, "rate limit exceeded");
            return RateLimitResult {
                success: false,
                limit,
                remaining: 0,
                reset: record.reset_time,
                error: Some(RateLimitError {
                    code: RATE_LIMIT_EXCEEDED.to_string(),
                    message: DENIAL_MESSAGE.to_string(),
                    retry_after: retry_after.div_ceil(1000),
                }),
            };
        }

        RateLimitResult {
            success: true,
            limit,
            remaining: limit - record.count,
            reset: record.reset_time,
            error: None,
        }
    }

    /// Forget `identity`'s window.
    pub fn reset(&self, identity: &str) {
        self.records().remove(identity);
    }

    /// Drop every record whose window has ended. Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| r.reset_time > now);
        before - records.len()
    }

    /// Number of identities currently tracked.
    pub fn store_size(&self) -> usize {
        self.records().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock advanced by hand.
    #[derive(Default)]
    pub(crate) struct ManualClock(AtomicI64);

    impl ManualClock {
        pub(crate) fn at(ms: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(ms)))
        }

        pub(crate) fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn limiter(window_ms: u64, max_requests: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::at(1_000_000);
        let limiter = RateLimiter::with_clock(
            RateLimitConfig {
                window_ms,
                max_requests,
            },
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_window_denies_then_recovers() {
        let (rl, clock) = limiter(100, 2);

        let first = rl.check("ip:1.2.3.4");
        assert!(first.success);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset, 1_000_100);
        assert!(rl.check("ip:1.2.3.4").success);

        let denied = rl.check("ip:1.2.3.4");
        assert!(!denied.success);
        assert_eq!(denied.remaining, 0);
        let error = denied.error.unwrap();
        assert_eq!(error.code, RATE_LIMIT_EXCEEDED);
        assert_eq!(error.message, DENIAL_MESSAGE);
        assert_eq!(error.retry_after, 1);

        clock.advance(150);
        let fresh = rl.check("ip:1.2.3.4");
        assert!(fresh.success);
        assert_eq!(fresh.remaining, 1);
        assert_eq!(fresh.reset, 1_000_250);
    }

    #[test]
    fn test_window_ends_exactly_at_reset_time() {
        let (rl, clock) = limiter(100, 1);
        assert!(rl.check("a").success);
        assert!(!rl.check("a").success);
        clock.advance(100);
        assert!(rl.check("a").success);
    }

    #[test]
    fn test_denial_does_not_extend_window() {
        let (rl, clock) = limiter(60_000, 1);
        let first = rl.check("a");
        clock.advance(10_500);
        let denied = rl.check("a");
        assert_eq!(denied.reset, first.reset);
        assert_eq!(denied.error.unwrap().retry_after, 50);
    }

    #[test]
    fn test_identities_are_independent() {
        let (rl, _) = limiter(1000, 1);
        assert!(rl.check("user:1").success);
        assert!(!rl.check("user:1").success);
        assert!(rl.check("user:2").success);
        assert_eq!(rl.store_size(), 2);
    }

    #[test]
    fn test_reset_identity() {
        let (rl, _) = limiter(1000, 1);
        rl.check("a");
        assert!(!rl.check("a").success);
        rl.reset("a");
        assert!(rl.check("a").success);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let (rl, clock) = limiter(100, 5);
        rl.check("a");
        clock.advance(50);
        rl.check("b");
        clock.advance(60);
        assert_eq!(rl.cleanup(), 1);
        assert_eq!(rl.store_size(), 1);
        clock.advance(100);
        assert_eq!(rl.cleanup(), 1);
        assert_eq!(rl.store_size(), 0);
    }

    #[test]
    fn test_concurrent_checks_respect_budget() {
        let (rl, _) = limiter(60_000, 10);
        let rl = Arc::new(rl);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || (0..5).filter(|_| rl.check("shared").success).count())
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_presets() {
        assert_eq!(RateLimitPreset::Authenticated.config().max_requests, 100);
        assert_eq!(RateLimitPreset::Unauthenticated.config().max_requests, 20);
        assert_eq!(RateLimitPreset::Sensitive.config().max_requests, 10);
        assert_eq!(RateLimitPreset::Strict.config().max_requests, 5);
        assert_eq!(RateLimitPreset::Strict.config().window_ms, 60_000);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let (rl, _) = limiter(1000, 0);
        let json = serde_json::to_value(rl.check("a")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["error"]["retryAfter"], 1);
    }
}
