use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

// Rate limit entry - tracks requests per client key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Per-client fixed-window counters.
///
/// `check` counts one request for `key` at `now` and must be atomic per key:
/// two concurrent calls for the same client may not both observe the same count.
/// Implementations backed by a shared store (e.g. Redis) can replace the
/// in-memory one without touching the handler.
pub trait RateLimitStore: Send + Sync {
    fn check(&self, key: &str, now: Instant) -> RateDecision;

    /// Drop entries whose window has ended. Returns how many were removed.
    fn purge_expired(&self, now: Instant) -> usize;

    fn tracked_keys(&self) -> usize;
}

pub struct MemoryRateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max: u32,
}

impl MemoryRateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max,
        }
    }
}

impl RateLimitStore for MemoryRateLimiter {
    fn check(&self, key: &str, now: Instant) -> RateDecision {
        // the entry guard holds the shard lock for the whole read-modify-write
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired (or brand new)? start over
        if entry.count == 0 || now.duration_since(entry.window_start) >= self.window {
            entry.count = 1;
            entry.window_start = now;
            return RateDecision::Allowed;
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max {
            let elapsed = now.duration_since(entry.window_start);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        RateDecision::Allowed
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
        before.saturating_sub(self.entries.len())
    }

    fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

// Sweeper - removes expired windows once per window so the table only holds active clients
pub async fn sweep_expired(store: Arc<dyn RateLimitStore>, every: Duration) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        let removed = store.purge_expired(Instant::now());
        crate::metrics::RATE_LIMIT_KEYS.set(store.tracked_keys() as f64);
        if removed > 0 {
            debug!(removed, "purged expired rate limit windows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn limiter() -> MemoryRateLimiter {
        MemoryRateLimiter::new(Duration::from_millis(60_000), 30)
    }

    #[test]
    fn thirty_first_request_is_rejected() {
        let limiter = limiter();
        let now = Instant::now();
        for i in 0..30 {
            let at = now + Duration::from_millis(i * 10);
            assert!(limiter.check("10.0.0.1", at).is_allowed(), "request {}", i + 1);
        }
        let decision = limiter.check("10.0.0.1", now + Duration::from_millis(400));
        assert_eq!(
            decision,
            RateDecision::Limited {
                retry_after: Duration::from_millis(59_600)
            }
        );
    }

    #[test]
    fn new_window_resets_regardless_of_prior_count() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..45 {
            limiter.check("10.0.0.1", now);
        }
        assert!(!limiter.check("10.0.0.1", now).is_allowed());
        // boundary is inclusive: elapsed == window starts a fresh one
        assert!(limiter
            .check("10.0.0.1", now + Duration::from_millis(60_000))
            .is_allowed());
        // and the fresh window counts from one again
        for _ in 0..29 {
            assert!(limiter
                .check("10.0.0.1", now + Duration::from_millis(60_001))
                .is_allowed());
        }
        assert!(!limiter
            .check("10.0.0.1", now + Duration::from_millis(60_002))
            .is_allowed());
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = MemoryRateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();
        assert!(limiter.check("a", now).is_allowed());
        assert!(!limiter.check("a", now).is_allowed());
        assert!(limiter.check("b", now).is_allowed());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn purge_only_drops_expired_windows() {
        let limiter = MemoryRateLimiter::new(Duration::from_secs(10), 5);
        let now = Instant::now();
        limiter.check("old", now);
        limiter.check("fresh", now + Duration::from_secs(8));
        let removed = limiter.purge_expired(now + Duration::from_secs(12));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn sweeper_empties_table_after_window() {
        let limiter = Arc::new(MemoryRateLimiter::new(Duration::from_millis(20), 5));
        limiter.check("10.0.0.1", Instant::now());
        limiter.check("10.0.0.2", Instant::now());
        assert_eq!(limiter.tracked_keys(), 2);

        let store: Arc<dyn RateLimitStore> = limiter.clone();
        let sweeper = tokio::spawn(sweep_expired(store, Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        sweeper.abort();

        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn concurrent_requests_do_not_lose_updates() {
        let limiter = Arc::new(MemoryRateLimiter::new(Duration::from_secs(3600), 100));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check("shared", now).is_allowed())
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }
}
