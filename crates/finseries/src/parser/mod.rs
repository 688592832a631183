//! Payload decoding.
//!
//! One decoder per [`PayloadEncoding`], all feeding the same row extraction:
//!
//! | Encoding | Decoder | Crate |
//! |----------|---------|-------|
//! | `XML` | element tree | `roxmltree` |
//! | `DELIMITED` | header + records | `csv` |
//! | `TAGGED_JSON` | array of objects | `serde_json` |
//! | `COLUMNAR_JSON` | `columns` / `data` block | `serde_json` |
//!
//! Text is decoded from the source's charset first (see
//! [`RawResponse::text`]). A blank payload is a well-formed empty result.

mod delimited;
mod json;
mod number;
mod row;
mod timestamp;
mod xml;

use std::sync::Arc;

use log::debug;

use crate::adapter::AdapterTable;
use crate::errors::SeriesError;
use crate::models::{HistoricalRecord, Instrument, RawResponse};
use crate::source::{FinancialSource, PayloadEncoding, SourceCatalog};

use row::Row;

fn visit_rows(
    source_id: &str,
    encoding: &PayloadEncoding,
    text: &str,
    selector: &str,
    visit: &mut dyn FnMut(&dyn Row) -> Result<(), SeriesError>,
) -> Result<(), SeriesError> {
    if text.trim().is_empty() {
        return Ok(());
    }
    match encoding {
        PayloadEncoding::Xml => xml::visit_rows(source_id, text, selector, visit),
        PayloadEncoding::Delimited { delimiter } => {
            delimited::visit_rows(source_id, text, *delimiter, visit)
        }
        PayloadEncoding::TaggedJson => json::visit_tagged(source_id, text, selector, visit),
        PayloadEncoding::ColumnarJson => json::visit_columnar(source_id, text, selector, visit),
    }
}

/// Decode a history payload with the source's declared layout.
pub(crate) fn decode_history(
    source: &FinancialSource,
    response: &RawResponse,
) -> Result<Vec<HistoricalRecord>, SeriesError> {
    let text = response.text(&source.charset);
    let layout = &source.history.layout;

    let mut records = Vec::new();
    visit_rows(
        &source.id,
        &source.encoding,
        &text,
        &layout.records,
        &mut |row| {
            if let Some(record) = row::extract_record(source, layout, row)? {
                records.push(record);
            }
            Ok(())
        },
    )?;

    if records.is_empty() && layout.empty_is_error {
        return Err(SeriesError::parse(&source.id, "at least one record", text));
    }

    debug!("{}: decoded {} records", source.id, records.len());
    Ok(records)
}

/// Decode one instrument listing page.
pub(crate) fn decode_listing(
    source: &FinancialSource,
    response: &RawResponse,
) -> Result<Vec<Instrument>, SeriesError> {
    let (Some(listing), Some(encoding)) = (&source.listing, source.listing_encoding()) else {
        return Err(SeriesError::validation(format!(
            "source {} has no instrument listing",
            source.id
        )));
    };
    let text = response.text(&source.charset);

    let mut instruments = Vec::new();
    visit_rows(
        &source.id,
        encoding,
        &text,
        &listing.layout.records,
        &mut |row| {
            instruments.push(row::extract_instrument(source, &listing.layout, row)?);
            Ok(())
        },
    )?;

    Ok(instruments)
}

fn ensure_success(source_id: &str, response: &RawResponse) -> Result<(), SeriesError> {
    if response.is_success() {
        return Ok(());
    }
    Err(SeriesError::parse(
        source_id,
        "successful response",
        format!("status {}", response.status),
    ))
}

/// Turns raw payloads into records using each source's adapter.
///
/// Pure: no I/O, safe to call from many threads at once.
#[derive(Clone, Debug)]
pub struct ResponseParser {
    catalog: Arc<SourceCatalog>,
    adapters: Arc<AdapterTable>,
}

impl ResponseParser {
    pub fn new(catalog: Arc<SourceCatalog>, adapters: Arc<AdapterTable>) -> Self {
        Self { catalog, adapters }
    }

    /// Decode one history payload of `source_id` into records, in payload order.
    pub fn parse(
        &self,
        source_id: &str,
        response: &RawResponse,
    ) -> Result<Vec<HistoricalRecord>, SeriesError> {
        let source = self.catalog.describe(source_id)?;
        ensure_success(source_id, response)?;
        self.adapters
            .for_source(source_id)
            .parse_history(&source, response)
    }

    /// Decode one instrument listing page of `source_id`.
    pub fn parse_listing(
        &self,
        source_id: &str,
        response: &RawResponse,
    ) -> Result<Vec<Instrument>, SeriesError> {
        let source = self.catalog.describe(source_id)?;
        ensure_success(source_id, response)?;
        self.adapters
            .for_source(source_id)
            .parse_listing(&source, response)
    }
}
