//! Request dispatch: windowing, bounded concurrency, rate limiting and retry.
//!
//! ```text
//! DownloadParameters
//!        │ partition(range, max_window_days)
//!        ▼
//!   [w0] [w1] [w2] ...        one future per window, joined in order
//!        │
//!        ▼ per attempt
//!   semaphore permit ─► token bucket ─► Transport::send (timeout)
//!        │
//!        ├─ success ─────────────────► WindowFetch { response: Ok }
//!        ├─ RetryClass::Never ───────► WindowFetch { response: Err(Transport) }
//!        └─ RetryClass::WithBackoff ─► sleep(delay) and retry,
//!                                      Err(SourceUnavailable) when exhausted
//! ```

mod rate_limiter;
mod retry;
mod windows;

pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use windows::{partition, window_count};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Semaphore;

use crate::adapter::AdapterTable;
use crate::errors::{RetryClass, SeriesError};
use crate::models::{DateRange, DownloadParameters, RawResponse};
use crate::source::SourceCatalog;
use crate::transport::{Transport, TransportError, TransportRequest};

/// Outcome of fetching one window.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowFetch {
    /// Position of the window in the partition.
    pub index: usize,
    pub window: DateRange,
    pub response: Result<RawResponse, SeriesError>,
}

/// Executes requests against sources within their limits.
pub struct RequestDispatcher {
    catalog: Arc<SourceCatalog>,
    adapters: Arc<AdapterTable>,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    pools: HashMap<String, Arc<Semaphore>>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        adapters: Arc<AdapterTable>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        let limiter = RateLimiter::new();
        let mut pools = HashMap::new();
        for source in catalog.sources() {
            limiter.configure(&source.id, source.rate_limit.clone());
            let workers = source.rate_limit.worker_pool_size();
            debug!("Source {} gets {} workers", source.id, workers);
            pools.insert(source.id.clone(), Arc::new(Semaphore::new(workers)));
        }

        Self {
            catalog,
            adapters,
            transport,
            limiter,
            pools,
            retry,
            request_timeout,
        }
    }

    /// Fetch every window of a download.
    ///
    /// Windows run concurrently within the source's worker pool. The result
    /// holds one entry per window, in window order; failures are recorded
    /// against their window rather than aborting the others.
    pub async fn fetch_history(
        &self,
        params: &DownloadParameters,
    ) -> Result<Vec<WindowFetch>, SeriesError> {
        let source = self.catalog.describe(params.source_id())?;
        let adapter = self.adapters.for_source(&source.id);
        let windows = partition(params.range(), source.max_window_days);

        info!(
            "Fetching {} {} in {} windows ({})",
            source.id,
            params.instrument().code(),
            windows.len(),
            params.range()
        );

        let source = &source;
        let adapter = &adapter;
        let fetches = windows.into_iter().enumerate().map(|(index, window)| async move {
            let response = match adapter.history_request(source, params, window) {
                Ok(request) => self.execute(&request).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &response {
                debug!("{} window {} ({}) failed: {}", source.id, index, window, e);
            }
            WindowFetch {
                index,
                window,
                response,
            }
        });

        Ok(join_all(fetches).await)
    }

    /// Fetch one page of an instrument listing.
    pub async fn fetch_listing_page(
        &self,
        source_id: &str,
        query: &str,
        page_index: u32,
    ) -> Result<RawResponse, SeriesError> {
        let source = self.catalog.describe(source_id)?;
        let request = self
            .adapters
            .for_source(source_id)
            .listing_request(&source, query, page_index)?;
        self.execute(&request).await
    }

    /// Send one request, retrying transient failures per the retry policy.
    pub async fn execute(&self, request: &TransportRequest) -> Result<RawResponse, SeriesError> {
        let source_id = request.source_id.as_str();
        let pool = self
            .pools
            .get(source_id)
            .ok_or_else(|| SeriesError::UnknownSource(source_id.to_string()))?;
        let max_attempts = self.retry.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = {
                let _permit = pool.acquire().await.map_err(|_| SeriesError::Cancelled {
                    reason: format!("worker pool for {} closed", source_id),
                })?;
                self.limiter.acquire(source_id).await;
                self.send_once(request).await
            };

            let error = match outcome {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match error.retry_class() {
                RetryClass::Never => {
                    return Err(SeriesError::Transport {
                        source_id: source_id.to_string(),
                        error,
                    })
                }
                RetryClass::WithBackoff if attempt >= max_attempts => {
                    warn!(
                        "{} unavailable after {} attempts: {}",
                        source_id, attempt, error
                    );
                    return Err(SeriesError::SourceUnavailable {
                        source_id: source_id.to_string(),
                        attempts: attempt,
                        last_error: error,
                    });
                }
                RetryClass::WithBackoff => {
                    let delay = self.retry.delay(attempt - 1);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        source_id, attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        let response = tokio::time::timeout(
            self.request_timeout,
            self.transport.send(request, self.request_timeout),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::from_status(response.status))
        }
    }
}
