//! Finseries Crate
//!
//! This crate retrieves historical financial time series (prices, rates,
//! index values) from heterogeneous public sources and returns them as one
//! normalized, ordered series.
//!
//! # Overview
//!
//! The crate supports:
//! - Sources described declaratively (endpoint templates, payload layout,
//!   number format, charset, window and rate limits)
//! - XML, delimited, tagged JSON and columnar JSON payloads
//! - Date windowing, bounded concurrency, rate limiting and retry
//! - Partial results with explicit gaps instead of silent truncation
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +---------------------------+
//! |  SourceCatalog   | --> | DownloadParametersFactory |  (fail-fast validation)
//! +------------------+     +---------------------------+
//!          |                             |
//!          v                             v
//! +------------------------+   +-------------------+
//! | InstrumentInfoProvider |   | RequestDispatcher |  (windows, pool, bucket, retry)
//! +------------------------+   +-------------------+
//!                                        |
//!                                        v
//!                              +-------------------+
//!                              |  ResponseParser   |  (per window, in parallel)
//!                              +-------------------+
//!                                        |
//!                                        v
//!                              +-------------------+
//!                              | HistoryAggregator |  (merge, dedup, gaps)
//!                              +-------------------+
//!                                        |
//!                                        v
//!                              +-------------------+
//!                              |  HistoryOutcome   |
//!                              +-------------------+
//! ```
//!
//! [`HistoryEngine`] wires the pipeline together. Per-source request
//! building and decoding go through the [`AdapterTable`]; the generic
//! [`TemplateAdapter`] covers any source its descriptor can describe.
//!
//! # Core Types
//!
//! - [`FinancialSource`] - Capability descriptor of a source
//! - [`Instrument`] - Source-scoped instrument reference
//! - [`DownloadParameters`] - Validated, immutable download request
//! - [`HistoricalRecord`] - One normalized observation
//! - [`UnifiedSeries`] - Strictly ordered, duplicate-free records
//! - [`HistoryOutcome`] - Complete series, or partial series with gaps

pub mod adapter;
pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod instruments;
pub mod models;
pub mod params;
pub mod parser;
pub mod source;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export all public types from models
pub use models::{
    DateRange, DownloadParameters, ExtraValue, Granularity, HistoricalRecord, HistoryOutcome,
    Instrument, InstrumentType, RawResponse, UnifiedSeries, WindowGap,
};

// Re-export pipeline components
pub use adapter::{AdapterTable, SourceAdapter, TemplateAdapter};
pub use aggregate::{DedupPolicy, HistoryAggregator};
pub use config::EngineConfig;
pub use dispatch::{RateLimiter, RequestDispatcher, RetryPolicy};
pub use engine::{HistoryEngine, HistoryEngineBuilder};
pub use errors::{RetryClass, SeriesError};
pub use instruments::{InstrumentInfoProvider, InstrumentStream};
pub use params::DownloadParametersFactory;
pub use parser::ResponseParser;
pub use source::{ActualityCheck, FinancialSource, SourceCatalog};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest};

pub use tokio_util::sync::CancellationToken;
