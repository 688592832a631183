//! Token bucket rate limiter for financial data sources.
//!
//! Implements per-source rate limiting using the token bucket algorithm.
//! Each source gets its own bucket sized from its [`RateLimit`].
//! Time is read from tokio's clock so paused-clock tests stay deterministic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::source::RateLimit;

/// Token bucket for a single source.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    fn with_limit(limit: &RateLimit) -> Self {
        let capacity = f64::from(limit.burst.max(1));
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: limit.requests_per_second,
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Try to acquire a token immediately.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.rate)
        }
    }
}

/// Token bucket rate limiter for multiple sources.
///
/// Thread-safe; buckets are created on first use from the configured
/// limit, or from [`RateLimit::default`] for an unconfigured source.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    limits: Mutex<HashMap<String, RateLimit>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// The worst case after recovery is slightly incorrect rate limiting,
    /// which is better than panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the limit for a source, resetting its bucket.
    pub fn configure(&self, source_id: &str, limit: RateLimit) {
        let mut limits = self.lock_limits();
        limits.insert(source_id.to_string(), limit);
        drop(limits); // Release limits lock before acquiring buckets lock

        self.lock_buckets().remove(source_id);
    }

    /// Wait (asynchronously) until a token is available for `source_id`.
    pub async fn acquire(&self, source_id: &str) {
        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();

                let bucket = buckets
                    .entry(source_id.to_string())
                    .or_insert_with(|| self.create_bucket(source_id));

                if bucket.try_acquire() {
                    debug!("Rate limiter: acquired token for '{}'", source_id);
                    return;
                }

                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!(
                    "Rate limiter: waiting {:?} for source '{}'",
                    wait_time, source_id
                );
                tokio::time::sleep(wait_time).await;
            }
        }
    }

    fn limit_for(&self, source_id: &str) -> RateLimit {
        self.lock_limits()
            .get(source_id)
            .cloned()
            .unwrap_or_default()
    }

    fn create_bucket(&self, source_id: &str) -> TokenBucket {
        TokenBucket::with_limit(&self.limit_for(source_id))
    }
}
