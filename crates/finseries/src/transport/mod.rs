//! Transport seam between the dispatcher and the network.
//!
//! The dispatcher only sees the [`Transport`] trait, so tests can script
//! responses and failures without a server. [`HttpTransport`] is the
//! production implementation.

mod http;

pub use http::HttpTransport;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::RetryClass;
use crate::models::RawResponse;
use crate::source::ProtocolFamily;

/// A failure below the payload level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The per-request timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// The server asked us to slow down (HTTP 429).
    #[error("rate limited by server")]
    RateLimited,

    /// Any other failure (malformed URL, broken body stream, ...).
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Map a non-success status code to an error.
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            Self::RateLimited
        } else {
            Self::Status { status }
        }
    }

    /// Returns the retry classification for this failure.
    ///
    /// | Failure | Retry |
    /// |---------|-------|
    /// | `Timeout`, `Connect`, `RateLimited` | With backoff |
    /// | `Status` 5xx or 408 | With backoff |
    /// | Other `Status` | Never |
    /// | `Other` | Never |
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout | Self::Connect(_) | Self::RateLimited => RetryClass::WithBackoff,
            Self::Status { status } if *status >= 500 || *status == 408 || *status == 429 => {
                RetryClass::WithBackoff
            }
            Self::Status { .. } | Self::Other(_) => RetryClass::Never,
        }
    }
}

/// One fully rendered request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRequest {
    /// Source the request belongs to; transports may pool connections by it.
    pub source_id: String,
    pub method: ProtocolFamily,
    pub url: String,
    /// Sent as query string for GET, as form body for POST.
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// Sends rendered requests and returns raw payloads.
///
/// Implementations return a [`RawResponse`] for every status the server
/// answered with; status classification happens in the dispatcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classes() {
        assert_eq!(TransportError::Timeout.retry_class(), RetryClass::WithBackoff);
        assert_eq!(
            TransportError::Connect("refused".into()).retry_class(),
            RetryClass::WithBackoff
        );
        assert_eq!(TransportError::RateLimited.retry_class(), RetryClass::WithBackoff);
        assert_eq!(
            TransportError::Status { status: 408 }.retry_class(),
            RetryClass::WithBackoff
        );
        assert_eq!(
            TransportError::Status { status: 503 }.retry_class(),
            RetryClass::WithBackoff
        );
        assert_eq!(
            TransportError::Status { status: 400 }.retry_class(),
            RetryClass::Never
        );
        assert_eq!(TransportError::Other("bad url".into()).retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(TransportError::from_status(429), TransportError::RateLimited);
        assert_eq!(
            TransportError::from_status(404),
            TransportError::Status { status: 404 }
        );
    }
}
