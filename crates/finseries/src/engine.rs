//! The pipeline facade.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use log::{debug, info, warn};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterTable, SourceAdapter};
use crate::aggregate::{HistoryAggregator, WindowRecords};
use crate::config::EngineConfig;
use crate::dispatch::{RequestDispatcher, WindowFetch};
use crate::errors::SeriesError;
use crate::instruments::{InstrumentInfoProvider, InstrumentStream};
use crate::models::{
    DateRange, DownloadParameters, ExtraValue, Granularity, HistoricalRecord, HistoryOutcome,
    Instrument, RawResponse,
};
use crate::params::DownloadParametersFactory;
use crate::parser::ResponseParser;
use crate::source::{FinancialSource, SourceCatalog};
use crate::transport::{HttpTransport, Transport};

/// Builder for [`HistoryEngine`].
pub struct HistoryEngineBuilder {
    catalog: SourceCatalog,
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    adapters: AdapterTable,
}

impl HistoryEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a custom adapter for one source.
    pub fn adapter(mut self, source_id: impl Into<String>, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.register(source_id, adapter);
        self
    }

    pub fn build(self) -> Result<HistoryEngine, SeriesError> {
        self.config.validate()?;

        let catalog = Arc::new(self.catalog);
        let adapters = Arc::new(self.adapters);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));

        let dispatcher = Arc::new(RequestDispatcher::new(
            Arc::clone(&catalog),
            Arc::clone(&adapters),
            transport,
            self.config.retry.clone(),
            self.config.request_timeout(),
        ));
        let parser = ResponseParser::new(Arc::clone(&catalog), adapters);
        let instruments = InstrumentInfoProvider::new(
            Arc::clone(&catalog),
            Arc::clone(&dispatcher),
            parser.clone(),
            self.config.max_listing_pages,
        );

        info!(
            "History engine ready with {} sources (dedup {:?}, {} attempts per request, at most {:?} each)",
            catalog.len(),
            self.config.dedup,
            self.config.retry.max_attempts(),
            self.config.retry.max_elapsed(self.config.request_timeout())
        );

        Ok(HistoryEngine {
            factory: DownloadParametersFactory::new(Arc::clone(&catalog), self.config.max_windows),
            catalog,
            dispatcher,
            parser,
            aggregator: HistoryAggregator::new(self.config.dedup),
            instruments,
            operation_timeout: self.config.operation_timeout(),
        })
    }
}

/// Retrieves historical series from any configured source.
///
/// Wires the pipeline together:
/// parameters → windowed fetch → parallel parse → clip → merge.
pub struct HistoryEngine {
    catalog: Arc<SourceCatalog>,
    factory: DownloadParametersFactory,
    dispatcher: Arc<RequestDispatcher>,
    parser: ResponseParser,
    aggregator: HistoryAggregator,
    instruments: InstrumentInfoProvider,
    operation_timeout: Option<Duration>,
}

impl HistoryEngine {
    pub fn builder(catalog: SourceCatalog) -> HistoryEngineBuilder {
        HistoryEngineBuilder {
            catalog,
            config: EngineConfig::default(),
            transport: None,
            adapters: AdapterTable::new(),
        }
    }

    /// Engine over HTTP with the given configuration.
    pub fn new(catalog: SourceCatalog, config: EngineConfig) -> Result<Self, SeriesError> {
        Self::builder(catalog).config(config).build()
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn describe(&self, source_id: &str) -> Result<Arc<FinancialSource>, SeriesError> {
        self.catalog.describe(source_id)
    }

    /// Lazily search a source's instruments. See [`InstrumentInfoProvider::search`].
    pub fn search(&self, source_id: &str, query: &str) -> InstrumentStream {
        self.instruments.search(source_id, query)
    }

    /// Validate a download request. See [`DownloadParametersFactory::build`].
    pub fn build_parameters(
        &self,
        instrument: &Instrument,
        range: DateRange,
        granularity: Granularity,
        extra: BTreeMap<String, ExtraValue>,
    ) -> Result<DownloadParameters, SeriesError> {
        self.factory.build(instrument, range, granularity, extra)
    }

    /// Decode a single payload of `source_id`.
    pub fn parse(
        &self,
        source_id: &str,
        response: &RawResponse,
    ) -> Result<Vec<HistoricalRecord>, SeriesError> {
        self.parser.parse(source_id, response)
    }

    /// Download the full history described by `params`.
    ///
    /// Returns [`HistoryOutcome::Partial`] when some windows failed for good.
    /// Cancelling `cancel`, or exceeding the configured operation timeout,
    /// drops every in-flight request and returns [`SeriesError::Cancelled`].
    pub async fn download(
        &self,
        params: &DownloadParameters,
        cancel: &CancellationToken,
    ) -> Result<HistoryOutcome, SeriesError> {
        let work = async {
            match self.operation_timeout {
                Some(limit) => tokio::time::timeout(limit, self.run(params))
                    .await
                    .unwrap_or_else(|_| {
                        Err(SeriesError::Cancelled {
                            reason: format!("operation timed out after {:?}", limit),
                        })
                    }),
                None => self.run(params).await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SeriesError::Cancelled {
                reason: "cancelled by caller".to_string(),
            }),
            result = work => result,
        };

        match &result {
            Ok(outcome) => info!(
                "Downloaded {} {}: {} records, {} gaps",
                params.source_id(),
                params.instrument().code(),
                outcome.series().len(),
                outcome.gaps().len()
            ),
            Err(e) => info!(
                "Download of {} {} failed: {}",
                params.source_id(),
                params.instrument().code(),
                e
            ),
        }
        result
    }

    /// Run the source's [`ActualityCheck`]: optionally confirm its listing
    /// is not empty, then download the reference range and compare it with
    /// the recorded values.
    ///
    /// A partial download fails the check. Fails with
    /// [`SeriesError::Validation`] when the source declares no check.
    pub async fn check(&self, source_id: &str, cancel: &CancellationToken) -> Result<(), SeriesError> {
        let source = self.catalog.describe(source_id)?;
        let check = source.check.as_ref().ok_or_else(|| {
            SeriesError::validation(format!("{} declares no actuality check", source.id))
        })?;

        if let Some(query) = &check.listing_query {
            let mut listing = self.search(&source.id, query);
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SeriesError::Cancelled {
                    reason: "cancelled by caller".to_string(),
                }),
                first = listing.try_next() => first?,
            };
            if first.is_none() {
                return Err(SeriesError::ActualityCheckFailed {
                    source_id: source.id.clone(),
                    message: format!("listing for {:?} is empty", query),
                });
            }
        }

        let params = self.build_parameters(
            &check.instrument(&source),
            check.range()?,
            check.granularity(&source)?,
            check.extra(&source)?,
        )?;
        let result = match self.download(&params, cancel).await? {
            HistoryOutcome::Complete(series) => check.verify(&source.id, &series),
            HistoryOutcome::Partial { gaps, .. } => Err(SeriesError::ActualityCheckFailed {
                source_id: source.id.clone(),
                message: format!("{} of the reference windows failed", gaps.len()),
            }),
        };

        match &result {
            Ok(()) => info!("Actuality check of {} passed", source.id),
            Err(e) => warn!("{}", e),
        }
        result
    }

    async fn run(&self, params: &DownloadParameters) -> Result<HistoryOutcome, SeriesError> {
        let source_id = params.source_id().to_string();
        let fetches = self.dispatcher.fetch_history(params).await?;

        let parser = self.parser.clone();
        let range = params.range();
        let parse_source = source_id.clone();
        let windows = tokio::task::spawn_blocking(move || {
            parse_windows(&parser, &parse_source, range, fetches)
        })
        .await
        .map_err(|e| SeriesError::Cancelled {
            reason: format!("parse task aborted: {}", e),
        })?;

        self.aggregator.merge(&source_id, windows)
    }
}

/// Parse every fetched window in parallel and clip to the requested range.
fn parse_windows(
    parser: &ResponseParser,
    source_id: &str,
    range: DateRange,
    fetches: Vec<WindowFetch>,
) -> Vec<WindowRecords> {
    fetches
        .into_par_iter()
        .map(|fetch| {
            let records = fetch
                .response
                .and_then(|response| parser.parse(source_id, &response))
                .map(|records| clip(source_id, range, records));
            WindowRecords {
                index: fetch.index,
                window: fetch.window,
                records,
            }
        })
        .collect()
}

fn clip(source_id: &str, range: DateRange, mut records: Vec<HistoricalRecord>) -> Vec<HistoricalRecord> {
    let before = records.len();
    records.retain(|record| range.contains(record.date()));
    if records.len() < before {
        debug!(
            "{}: dropped {} records outside {}",
            source_id,
            before - records.len(),
            range
        );
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstrumentType;
    use crate::testing::ScriptedTransport;
    use chrono::NaiveDate;

    const CATALOG: &str = r#"{
        "sources": [{
            "id": "SLOW",
            "encoding": { "type": "DELIMITED" },
            "max_window_days": 10,
            "granularities": ["DAILY"],
            "instrument_types": ["FUND"],
            "rate_limit": { "requests_per_second": 100.0, "burst": 4 },
            "history": {
                "request": { "url": "https://slow.test/{code}", "query": [["from", "{start}"]] },
                "layout": {
                    "timestamp": { "field": "date", "format": { "kind": "PATTERN", "pattern": "%Y-%m-%d" } },
                    "values": [{ "name": "nav", "field": "nav" }]
                }
            }
        }]
    }"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine(transport: Arc<ScriptedTransport>, config: EngineConfig) -> HistoryEngine {
        HistoryEngine::builder(SourceCatalog::from_json_str(CATALOG).unwrap())
            .config(config)
            .transport(transport)
            .build()
            .unwrap()
    }

    fn params(engine: &HistoryEngine) -> DownloadParameters {
        let fund = Instrument::new("SLOW", "F1", "Fund one", InstrumentType::Fund);
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 20)).unwrap();
        engine
            .build_parameters(&fund, range, Granularity::Daily, BTreeMap::new())
            .unwrap()
    }

    fn respond_with_window_start(
        request: &crate::transport::TransportRequest,
        _: usize,
    ) -> Result<RawResponse, crate::transport::TransportError> {
        let from = ScriptedTransport::param(request, "from").unwrap_or_default();
        // one record on the window start, one outside the requested range
        Ok(RawResponse::ok(format!(
            "date,nav\n{},10.5\n2023-12-31,1\n",
            from
        )))
    }

    #[tokio::test]
    async fn test_download_clips_and_merges() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = engine(transport.clone(), EngineConfig::default());

        let outcome = engine
            .download(&params(&engine), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.is_partial());
        let dates: Vec<String> = outcome.series().iter().map(|r| r.date().to_string()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-11"]);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_requests() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = engine(transport.clone(), EngineConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.download(&params(&engine), &cancel).await;

        assert!(matches!(result, Err(SeriesError::Cancelled { .. })));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_download() {
        let mut transport = ScriptedTransport::new(respond_with_window_start);
        transport.latency = Duration::from_secs(20);
        let transport = Arc::new(transport);
        let engine = engine(transport.clone(), EngineConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = engine.download(&params(&engine), &cancel).await;
        assert_eq!(
            result,
            Err(SeriesError::Cancelled {
                reason: "cancelled by caller".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_timeout() {
        let mut transport = ScriptedTransport::new(respond_with_window_start);
        transport.latency = Duration::from_secs(20);
        let transport = Arc::new(transport);
        let config = EngineConfig {
            operation_timeout_ms: Some(5_000),
            ..EngineConfig::default()
        };
        let engine = engine(transport, config);

        let result = engine
            .download(&params(&engine), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(SeriesError::Cancelled { ref reason }) if reason.contains("timed out")
        ));
    }

    fn checked_engine(transport: Arc<ScriptedTransport>, expected: &str) -> HistoryEngine {
        let check = format!(
            r#""instrument_types": ["FUND"],
            "check": {{
                "code": "F1",
                "start": "2024-01-01",
                "end": "2024-01-20",
                "expected": [{}]
            }},"#,
            expected
        );
        let json = CATALOG.replace(r#""instrument_types": ["FUND"],"#, &check);
        HistoryEngine::builder(SourceCatalog::from_json_str(&json).unwrap())
            .transport(transport)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_check_passes_on_reference_values() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = checked_engine(
            transport.clone(),
            r#"{ "date": "2024-01-11", "name": "nav", "value": "10.50" }"#,
        );

        engine.check("SLOW", &CancellationToken::new()).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_check_detects_changed_value() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = checked_engine(
            transport,
            r#"{ "date": "2024-01-01", "name": "nav", "value": "11" }"#,
        );

        let result = engine.check("SLOW", &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SeriesError::ActualityCheckFailed { ref message, .. }) if message.contains("10.5")
        ));
    }

    #[tokio::test]
    async fn test_check_detects_missing_record() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = checked_engine(
            transport,
            r#"{ "date": "2024-01-05", "name": "nav", "value": "10.5" }"#,
        );

        let result = engine.check("SLOW", &CancellationToken::new()).await;
        assert!(matches!(result, Err(SeriesError::ActualityCheckFailed { .. })));
    }

    #[tokio::test]
    async fn test_check_fails_on_partial_download() {
        let transport = Arc::new(ScriptedTransport::new(|request, _| {
            match ScriptedTransport::param(request, "from") {
                Some("2024-01-11") => Err(crate::transport::TransportError::Status { status: 404 }),
                _ => respond_with_window_start(request, 0),
            }
        }));
        let engine = checked_engine(
            transport,
            r#"{ "date": "2024-01-01", "name": "nav", "value": "10.5" }"#,
        );

        let result = engine.check("SLOW", &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SeriesError::ActualityCheckFailed { ref message, .. }) if message.contains("1 of")
        ));
    }

    #[tokio::test]
    async fn test_check_requires_declared_check() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let engine = engine(transport.clone(), EngineConfig::default());

        let result = engine.check("SLOW", &CancellationToken::new()).await;
        assert!(matches!(result, Err(SeriesError::Validation { .. })));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(ScriptedTransport::new(respond_with_window_start));
        let config = EngineConfig {
            max_windows: 0,
            ..EngineConfig::default()
        };
        let result = HistoryEngine::builder(SourceCatalog::from_json_str(CATALOG).unwrap())
            .config(config)
            .transport(transport)
            .build();
        assert!(matches!(result, Err(SeriesError::Config { .. })));
    }
}
