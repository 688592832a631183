//! Source capability descriptors and the catalog that serves them.
//!
//! - `capabilities` - What a source supports and how it must be called
//! - `layout` - Where values live inside a source's payloads
//! - `catalog` - Validated, read-only registry keyed by source id
//! - `actuality` - Reference values that confirm a source still works

mod actuality;
mod capabilities;
mod catalog;
mod layout;

pub use actuality::{ActualityCheck, ExpectedValue};
pub use capabilities::{
    ExtraFieldSpec, ExtraKind, FinancialSource, HistoryEndpoint, ListingEndpoint, PageSpec,
    PayloadEncoding, ProtocolFamily, RateLimit, RequestTemplate, HISTORY_PLACEHOLDERS,
    LISTING_PLACEHOLDERS,
};
pub use catalog::SourceCatalog;
pub use layout::{
    FieldSpec, InstrumentLayout, NumberFormat, RecordLayout, TimestampFormat, TimestampSpec,
};
