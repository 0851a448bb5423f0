//! Sliding-window rate limiter keyed by sender, IP, or user.

use crate::audit::{AuditCategory, AuditEvent, SecurityAuditor, Severity};
use crate::throttle::clock::{Clock, SystemClock};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Window bounds. There are no built-in defaults; callers supply them
/// (see `GuardConfig::email_rate_limit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Admission timestamps of one key, oldest first.
#[derive(Debug, Default)]
pub struct RateWindow {
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop expired stamps from the front. Stamps are recorded in time order.
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) < window {
                break;
            }
            self.stamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Per-key sliding-window limiter.
///
/// Each key's window sits behind its own mutex, so check-and-record is atomic
/// per key while different keys proceed independently.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Arc<Mutex<RateWindow>>>,
    clock: Arc<dyn Clock>,
    auditor: Arc<SecurityAuditor>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, auditor: Arc<SecurityAuditor>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock), auditor)
    }

    pub fn with_clock(
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
        auditor: Arc<SecurityAuditor>,
    ) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            clock,
            auditor,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Admit one operation for `key` at the limiter's clock time.
    pub fn check(&self, key: &str) -> bool {
        self.is_allowed(key, self.clock.now())
    }

    /// Purge stale entries, then admit and record `now` iff the window holds
    /// fewer than `max_requests` entries. Denials are audited.
    pub fn is_allowed(&self, key: &str, now: Instant) -> bool {
        let window = self.window(key);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.purge(now, self.config.window);

        let count = window.len();
        if count < self.config.max_requests as usize {
            // A caller-supplied `now` older than the newest stamp is recorded
            // as that stamp, keeping the deque ordered.
            let stamp = window.stamps.back().map_or(now, |last| now.max(*last));
            window.stamps.push_back(stamp);
            return true;
        }
        drop(window);

        self.auditor.log_event(
            AuditEvent::new(AuditCategory::RateLimit, Severity::Warning, key)
                .with_detail("rate limit exceeded")
                .with_context("requests", count.to_string())
                .with_context("max_requests", self.config.max_requests.to_string())
                .with_context("window_secs", self.config.window.as_secs().to_string()),
        );
        false
    }

    /// Slots left for `key` at `now`, without recording anything.
    pub fn remaining(&self, key: &str, now: Instant) -> u32 {
        let Some(window) = self.windows.get(key).map(|w| w.value().clone()) else {
            return self.config.max_requests;
        };
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.purge(now, self.config.window);
        self.config
            .max_requests
            .saturating_sub(u32::try_from(window.len()).unwrap_or(u32::MAX))
    }

    /// Drop windows that are empty at `now` and not in use. Returns how many
    /// were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let window_len = self.config.window;
        self.windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut guard = window.lock().unwrap_or_else(PoisonError::into_inner);
            guard.purge(now, window_len);
            !guard.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn window(&self, key: &str) -> Arc<Mutex<RateWindow>> {
        if let Some(existing) = self.windows.get(key) {
            return existing.value().clone();
        }
        self.windows
            .entry(key.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::throttle::clock::ManualClock;

    fn limiter(max: u32, window: Duration) -> (RateLimiter, Arc<ManualClock>, Arc<MemorySink>) {
        let (auditor, sink) = SecurityAuditor::in_memory();
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(
            RateLimitConfig::new(max, window),
            clock.clone(),
            Arc::new(auditor),
        );
        (limiter, clock, sink)
    }

    #[test]
    fn test_admits_exactly_max_then_denies() {
        let (limiter, clock, sink) = limiter(3, Duration::from_secs(3600));
        let now = clock.now();
        let verdicts: Vec<bool> = (0..4).map(|_| limiter.is_allowed("sender@a.com", now)).collect();
        assert_eq!(verdicts, vec![true, true, true, false]);
        assert_eq!(sink.count(AuditCategory::RateLimit), 1);
    }

    #[test]
    fn test_readmits_after_window() {
        let (limiter, clock, _) = limiter(2, Duration::from_secs(60));
        assert!(limiter.check("k"));
        clock.advance(Duration::from_secs(30));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));

        // first stamp falls out of the window
        clock.advance(Duration::from_secs(30));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[test]
    fn test_denial_is_not_recorded() {
        let (limiter, clock, _) = limiter(1, Duration::from_secs(10));
        assert!(limiter.check("k"));
        clock.advance(Duration::from_secs(5));
        assert!(!limiter.check("k"));
        clock.advance(Duration::from_secs(5));
        // only the admitted stamp counted; the denial at t=5 did not extend it
        assert!(limiter.check("k"));
    }

    #[test]
    fn test_out_of_order_calls_keep_window_ordered() {
        let (limiter, clock, _) = limiter(2, Duration::from_secs(60));
        let earlier = clock.now();
        clock.advance(Duration::from_secs(30));
        let later = clock.now();

        assert!(limiter.is_allowed("k", later));
        assert!(limiter.is_allowed("k", earlier));
        assert!(!limiter.is_allowed("k", later));

        clock.advance(Duration::from_secs(59));
        assert_eq!(limiter.remaining("k", clock.now()), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.remaining("k", clock.now()), 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, clock, _) = limiter(1, Duration::from_secs(60));
        let now = clock.now();
        assert!(limiter.is_allowed("a", now));
        assert!(limiter.is_allowed("b", now));
        assert!(!limiter.is_allowed("a", now));
        assert_eq!(limiter.remaining("b", now), 0);
        assert_eq!(limiter.remaining("c", now), 1);
    }

    #[test]
    fn test_sweep_drops_idle_windows() {
        let (limiter, clock, _) = limiter(5, Duration::from_secs(60));
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked_keys(), 2);
        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.sweep(clock.now()), 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_concurrent_single_slot() {
        let (limiter, clock, _) = limiter(10, Duration::from_secs(3600));
        let limiter = Arc::new(limiter);
        let now = clock.now();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.is_allowed("shared", now))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_zero_quota_denies_everything() {
        let (limiter, _, _) = limiter(0, Duration::from_secs(1));
        assert!(!limiter.check("k"));
    }
}
