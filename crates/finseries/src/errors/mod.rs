//! Error types and retry classification for the finseries crate.
//!
//! This module provides:
//! - [`SeriesError`]: The main error enum for all retrieval operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::WindowGap;
use crate::transport::TransportError;

/// Longest payload excerpt kept in a [`SeriesError::Parse`].
const MAX_FRAGMENT_CHARS: usize = 200;

/// Errors that can occur while retrieving a historical series.
///
/// Every variant is `Clone` so a failure can be recorded against the window
/// it belongs to and still be reported to the caller after the join.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    /// The request parameters are malformed.
    /// Detected before any network call; never retried.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the request
        message: String,
    },

    /// The referenced source is not registered in the catalog.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A non-transient transport failure (e.g. HTTP 404).
    #[error("Transport error: {source_id} - {error}")]
    Transport {
        /// The source that was called
        source_id: String,
        /// The underlying transport failure
        error: TransportError,
    },

    /// Transient failures persisted through every retry attempt.
    #[error("Source unavailable: {source_id} after {attempts} attempts - {last_error}")]
    SourceUnavailable {
        /// The source that could not be reached
        source_id: String,
        /// Number of attempts made
        attempts: u32,
        /// The failure observed on the final attempt
        last_error: TransportError,
    },

    /// The payload did not match the shape the source declares.
    #[error("Parse error: {source_id} - expected {expected}, got {fragment:?}")]
    Parse {
        /// The source whose payload failed to parse
        source_id: String,
        /// Description of the expected shape
        expected: String,
        /// Excerpt of the offending payload
        fragment: String,
    },

    /// The merged series violates its ordering invariant.
    #[error("Integrity violation: {message}")]
    Integrity {
        /// Description of the violation
        message: String,
    },

    /// The operation was aborted by the caller or by its timeout.
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Why the operation stopped
        reason: String,
    },

    /// A source descriptor or engine setting is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration defect
        message: String,
    },

    /// An instrument listing kept producing pages past the configured limit.
    #[error("Page limit exceeded: {source_id} - more than {limit} pages")]
    PageLimitExceeded {
        /// The source being listed
        source_id: String,
        /// The configured page limit
        limit: usize,
    },

    /// Every window of a download failed; there is nothing to return.
    #[error("All {} windows failed for {source_id}", gaps.len())]
    AllWindowsFailed {
        /// The source that was queried
        source_id: String,
        /// One gap per failed window, in window order
        gaps: Vec<WindowGap>,
    },

    /// A source no longer returns the reference values recorded for it.
    #[error("Actuality check failed: {source_id} - {message}")]
    ActualityCheckFailed {
        /// The source being checked
        source_id: String,
        /// What differed from the recorded reference
        message: String,
    },
}

impl SeriesError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Build a parse error, truncating the offending fragment so large
    /// payloads don't end up verbatim in logs.
    pub fn parse(
        source_id: impl Into<String>,
        expected: impl Into<String>,
        fragment: impl AsRef<str>,
    ) -> Self {
        let fragment = fragment.as_ref();
        let fragment = match fragment.char_indices().nth(MAX_FRAGMENT_CHARS) {
            Some((cut, _)) => format!("{}...", &fragment[..cut]),
            None => fragment.to_string(),
        };

        Self::Parse {
            source_id: source_id.into(),
            expected: expected.into(),
            fragment,
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// Only transport failures can be transient; everything else is a
    /// property of the request or the payload and is returned as-is.
    ///
    /// # Examples
    ///
    /// ```
    /// use finseries::errors::{RetryClass, SeriesError};
    /// use finseries::transport::TransportError;
    ///
    /// let error = SeriesError::Transport {
    ///     source_id: "CBR".to_string(),
    ///     error: TransportError::Status { status: 503 },
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = SeriesError::validation("start after end");
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport { error, .. } => error.retry_class(),

            Self::Validation { .. }
            | Self::UnknownSource(_)
            | Self::SourceUnavailable { .. }
            | Self::Parse { .. }
            | Self::Integrity { .. }
            | Self::Cancelled { .. }
            | Self::Config { .. }
            | Self::PageLimitExceeded { .. }
            | Self::AllWindowsFailed { .. }
            | Self::ActualityCheckFailed { .. } => RetryClass::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_never_retries() {
        let error = SeriesError::validation("granularity not supported");
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_server_error_retries_with_backoff() {
        let error = SeriesError::Transport {
            source_id: "MOEX".to_string(),
            error: TransportError::Status { status: 502 },
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_client_error_never_retries() {
        let error = SeriesError::Transport {
            source_id: "MOEX".to_string(),
            error: TransportError::Status { status: 404 },
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_exhausted_source_never_retries() {
        let error = SeriesError::SourceUnavailable {
            source_id: "CBR".to_string(),
            attempts: 4,
            last_error: TransportError::Timeout,
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_parse_fragment_truncated() {
        let payload = "x".repeat(500);
        let SeriesError::Parse { fragment, .. } = SeriesError::parse("CBR", "XML", &payload) else {
            panic!("expected parse error");
        };
        assert_eq!(fragment.chars().count(), MAX_FRAGMENT_CHARS + 3);
        assert!(fragment.ends_with("..."));
    }

    #[test]
    fn test_error_display() {
        let error = SeriesError::UnknownSource("NOPE".to_string());
        assert_eq!(format!("{}", error), "Unknown source: NOPE");

        let error = SeriesError::SourceUnavailable {
            source_id: "CBR".to_string(),
            attempts: 3,
            last_error: TransportError::Timeout,
        };
        assert_eq!(
            format!("{}", error),
            "Source unavailable: CBR after 3 attempts - request timed out"
        );

        let error = SeriesError::parse("SOLACTIVE", "JSON array", "{}");
        assert_eq!(
            format!("{}", error),
            "Parse error: SOLACTIVE - expected JSON array, got \"{}\""
        );
    }
}
