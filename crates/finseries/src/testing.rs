//! In-memory transport shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::RawResponse;
use crate::transport::{Transport, TransportError, TransportRequest};

type Respond =
    dyn Fn(&TransportRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync;

/// Answers every request with a closure of (request, call number).
pub(crate) struct ScriptedTransport {
    calls: AtomicUsize,
    pub(crate) seen: Mutex<Vec<TransportRequest>>,
    respond: Box<Respond>,
    pub(crate) latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new(
        respond: impl Fn(&TransportRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Value of a query parameter in a request.
    pub(crate) fn param<'a>(request: &'a TransportRequest, name: &str) -> Option<&'a str> {
        request
            .params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(request, call)
    }
}
