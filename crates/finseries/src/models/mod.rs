//! Data models
//!
//! This module contains the core data types of the retrieval pipeline:
//! - `instrument` - Source-scoped instrument descriptors and the InstrumentType enum
//! - `granularity` - Sampling frequency of a series
//! - `date_range` - Inclusive calendar ranges and windows
//! - `params` - Validated download parameters and extra field values
//! - `response` - Raw transport payloads awaiting parsing
//! - `record` - Normalized historical records
//! - `series` - The unified series, window gaps and the download outcome

mod date_range;
mod granularity;
mod instrument;
mod params;
mod record;
mod response;
mod series;

pub use date_range::DateRange;
pub use granularity::Granularity;
pub use instrument::{Instrument, InstrumentType};
pub use params::{DownloadParameters, ExtraValue};
pub use record::{midnight_utc, HistoricalRecord};
pub use response::RawResponse;
pub use series::{HistoryOutcome, UnifiedSeries, WindowGap};
