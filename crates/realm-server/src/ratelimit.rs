//! Per-key rate limiter backed by `dashmap` for fine-grained per-bucket
//! locking, with a periodic sweep to bound memory (§4.5).
//!
//! The window is a fixed window (not sliding), re-synchronized the first
//! time a key is hit after its window has elapsed. This is documented here
//! as the chosen policy: the choice is consistent across calls for a given
//! key, as the contract requires.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Allow(u32),
    Deny(u32),
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// A process-wide, concurrently-accessed rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Atomically increments `key`'s counter and decides `Allow`/`Deny`
    /// against `limit` within the trailing `window_ms`.
    pub fn hit(&self, key: &str, window_ms: u64, limit: u32) -> HitOutcome {
        self.hit_at(key, window_ms, limit, Instant::now())
    }

    /// Same as [`RateLimiter::hit`] but with an injected clock, so tests
    /// don't need real sleeps to exercise window rollover.
    pub fn hit_at(&self, key: &str, window_ms: u64, limit: u32, now: Instant) -> HitOutcome {
        let window = Duration::from_millis(window_ms);
        let mut entry = self.buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count < limit {
            entry.count += 1;
            HitOutcome::Allow(entry.count)
        } else {
            HitOutcome::Deny(limit)
        }
    }

    /// Removes buckets whose window rolled over more than `max_age` ago,
    /// bounding memory use. Intended to be run on a periodic background
    /// task (default every 10 minutes per §4.5).
    pub fn sweep(&self, max_age: Duration) {
        self.sweep_at(max_age, Instant::now());
    }

    pub fn sweep_at(&self, max_age: Duration, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.window_start) < max_age);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic sweep task described in §4.5.
pub fn spawn_sweeper(limiter: std::sync::Arc<RateLimiter>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            limiter.sweep(interval);
        }
    })
}
