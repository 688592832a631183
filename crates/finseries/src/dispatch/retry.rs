//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How often and how patiently transient failures are retried.
///
/// The delay before retry `n` (0-based) is
/// `initial_backoff * backoff_factor ^ n`, randomized by +/- 50% when
/// `jitter` is set, and never more than `max_backoff`.
///
/// Each attempt is cut off at the request timeout, so one request spends at
/// most `max_attempts * request_timeout + (max_attempts - 1) * max_backoff`
/// in the transport and between attempts; see [`RetryPolicy::max_elapsed`].
/// Waiting for a worker slot or a rate-limit token is not included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first. At least 1.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Upper bound on the time one request can take across all attempts,
    /// excluding queueing for a worker slot or a rate-limit token.
    pub fn max_elapsed(&self, request_timeout: Duration) -> Duration {
        let attempts = self.max_attempts();
        request_timeout.saturating_mul(attempts) + self.max_backoff().saturating_mul(attempts - 1)
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let max_ms = self.max_backoff_ms as f64;
        let scale = self.backoff_factor.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let mut millis = (self.initial_backoff_ms as f64 * scale).min(max_ms);

        if self.jitter && millis > 0.0 {
            let spread = millis * 0.5;
            millis += rand::thread_rng().gen_range(-spread..=spread);
        }

        Duration::from_millis(millis.clamp(0.0, max_ms) as u64)
    }
}
