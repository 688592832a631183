//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use finseries::{
    EngineConfig, HistoryEngine, RawResponse, SourceCatalog, Transport, TransportError,
    TransportRequest,
};

/// Fund source serving one NAV per calendar day as CSV.
pub fn funds_catalog(max_window_days: Option<u32>) -> SourceCatalog {
    let window = max_window_days
        .map(|days| days.to_string())
        .unwrap_or_else(|| "null".to_string());
    let json = format!(
        r#"{{
            "sources": [{{
                "id": "FUNDS",
                "encoding": {{ "type": "DELIMITED", "delimiter": ";" }},
                "max_window_days": {window},
                "granularities": ["DAILY"],
                "instrument_types": ["FUND"],
                "rate_limit": {{ "requests_per_second": 50.0, "burst": 10 }},
                "number_format": {{ "decimal_separator": "," }},
                "history": {{
                    "request": {{
                        "url": "https://funds.test/nav/{{code}}",
                        "query": [["from", "{{start}}"], ["to", "{{end}}"]]
                    }},
                    "layout": {{
                        "timestamp": {{ "field": "date", "format": {{ "kind": "PATTERN", "pattern": "%Y-%m-%d" }} }},
                        "values": [{{ "name": "nav", "field": "nav" }}]
                    }}
                }}
            }}]
        }}"#
    );
    SourceCatalog::from_json_str(&json).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn param<'a>(request: &'a TransportRequest, name: &str) -> Option<&'a str> {
    request
        .params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Deterministic NAV for a date: `100,<ordinal>`.
pub fn nav_csv(from: NaiveDate, to: NaiveDate) -> String {
    let mut body = String::from("date;nav\n");
    for day in from.iter_days().take_while(|day| *day <= to) {
        body.push_str(&format!("{};100,{}\n", day, day.ordinal()));
    }
    body
}

type Respond =
    dyn Fn(&TransportRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync;

/// Transport answering from a closure of (request, call number).
pub struct MockTransport {
    calls: AtomicUsize,
    latency: Duration,
    respond: Box<Respond>,
}

impl MockTransport {
    pub fn new(
        respond: impl Fn(&TransportRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Self::delayed(Duration::ZERO, respond)
    }

    /// Like [`MockTransport::new`], but every call first sleeps `latency`.
    pub fn delayed(
        latency: Duration,
        respond: impl Fn(&TransportRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            latency,
            respond: Box::new(respond),
        })
    }

    /// Serves [`nav_csv`] for the requested window.
    pub fn navs() -> Arc<Self> {
        Self::new(|request, _| Ok(RawResponse::ok(window_navs(request))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn window_navs(request: &TransportRequest) -> String {
    let bound = |name| {
        param(request, name)
            .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
            .unwrap()
    };
    nav_csv(bound("from"), bound("to"))
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(request, call)
    }
}

pub fn engine(
    catalog: SourceCatalog,
    transport: Arc<MockTransport>,
    config: EngineConfig,
) -> HistoryEngine {
    HistoryEngine::builder(catalog)
        .config(config)
        .transport(transport)
        .build()
        .unwrap()
}
