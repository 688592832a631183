//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! {
//!   "retry": { "max_attempts": 5, "initial_backoff_ms": 250 },
//!   "dedup": "STRICT",
//!   "operation_timeout_ms": 120000
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::DedupPolicy;
use crate::dispatch::RetryPolicy;
use crate::errors::SeriesError;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default cap on the number of windows one download may span.
const DEFAULT_MAX_WINDOWS: usize = 1_000;

/// Default cap on listing pages, guarding against sources that never end.
const DEFAULT_MAX_LISTING_PAGES: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub dedup: DedupPolicy,
    pub request_timeout_ms: u64,
    /// Whole-download deadline; `None` waits as long as retries allow.
    pub operation_timeout_ms: Option<u64>,
    pub max_windows: usize,
    pub max_listing_pages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dedup: DedupPolicy::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            operation_timeout_ms: None,
            max_windows: DEFAULT_MAX_WINDOWS,
            max_listing_pages: DEFAULT_MAX_LISTING_PAGES,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SeriesError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SeriesError::config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SeriesError> {
        if self.request_timeout_ms == 0 {
            return Err(SeriesError::config("request_timeout_ms must be positive"));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(SeriesError::config("operation_timeout_ms must be positive"));
        }
        if self.max_windows == 0 || self.max_listing_pages == 0 {
            return Err(SeriesError::config(
                "max_windows and max_listing_pages must be positive",
            ));
        }
        let factor = self.retry.backoff_factor;
        if !(factor.is_finite() && factor >= 1.0) {
            return Err(SeriesError::config(format!(
                "backoff_factor must be at least 1, got {}",
                factor
            )));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(SeriesError::config(
                "initial_backoff_ms exceeds max_backoff_ms",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_json_str(
            r#"{"retry": {"max_attempts": 5}, "dedup": "STRICT", "operation_timeout_ms": 120000}"#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.dedup, DedupPolicy::Strict);
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_listing_pages, DEFAULT_MAX_LISTING_PAGES);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        for json in [
            r#"{"request_timeout_ms": 0}"#,
            r#"{"max_windows": 0}"#,
            r#"{"retry": {"backoff_factor": 0.5}}"#,
            r#"{"retry": {"initial_backoff_ms": 5000, "max_backoff_ms": 100}}"#,
            r#"{"dedup": "SOMETIMES"}"#,
        ] {
            assert!(
                matches!(EngineConfig::from_json_str(json), Err(SeriesError::Config { .. })),
                "accepted {}",
                json
            );
        }
    }
}
