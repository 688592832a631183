//! Per-source request building and payload decoding strategies.
//!
//! Most sources are fully described by their [`FinancialSource`] descriptor
//! and served by the generic [`TemplateAdapter`]. A source with quirks the
//! descriptor cannot express gets its own [`SourceAdapter`] registered in the
//! [`AdapterTable`] at startup.

pub(crate) mod template;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::errors::SeriesError;
use crate::models::{DateRange, DownloadParameters, HistoricalRecord, Instrument, RawResponse};
use crate::parser;
use crate::source::{FinancialSource, RequestTemplate};
use crate::transport::TransportRequest;

/// Strategy for talking to one source.
///
/// Request builders are pure; the dispatcher owns the network. Parsers
/// receive only successful responses.
///
/// # Example
///
/// ```ignore
/// use finseries::adapter::{AdapterTable, SourceAdapter, TemplateAdapter};
///
/// struct LegacyCsvAdapter;
///
/// impl SourceAdapter for LegacyCsvAdapter {
///     fn parse_history(&self, source: &FinancialSource, response: &RawResponse)
///         -> Result<Vec<HistoricalRecord>, SeriesError>
///     {
///         // strip a banner line, then use the generic decoder
///     }
///     // ... other methods delegate to TemplateAdapter
/// }
///
/// let mut adapters = AdapterTable::new();
/// adapters.register("LEGACY", Arc::new(LegacyCsvAdapter));
/// ```
pub trait SourceAdapter: Send + Sync {
    /// Build the request for one window of a download.
    fn history_request(
        &self,
        source: &FinancialSource,
        params: &DownloadParameters,
        window: DateRange,
    ) -> Result<TransportRequest, SeriesError>;

    /// Decode one history payload into records, in payload order.
    fn parse_history(
        &self,
        source: &FinancialSource,
        response: &RawResponse,
    ) -> Result<Vec<HistoricalRecord>, SeriesError>;

    /// Build the request for one page of an instrument listing.
    ///
    /// `page_index` counts from zero regardless of the source's numbering.
    fn listing_request(
        &self,
        source: &FinancialSource,
        query: &str,
        page_index: u32,
    ) -> Result<TransportRequest, SeriesError>;

    /// Decode one listing page.
    fn parse_listing(
        &self,
        source: &FinancialSource,
        response: &RawResponse,
    ) -> Result<Vec<Instrument>, SeriesError>;
}

/// Adapter driven entirely by the source descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateAdapter;

impl TemplateAdapter {
    fn render(
        source: &FinancialSource,
        template: &RequestTemplate,
        vars: &BTreeMap<&str, String>,
    ) -> Result<TransportRequest, SeriesError> {
        let missing = |name: String| {
            SeriesError::config(format!(
                "{}: no value for placeholder {{{}}}",
                source.id, name
            ))
        };

        let url = template::render(&template.url, vars, true).map_err(missing)?;
        let params = template
            .query
            .iter()
            .map(|(name, value)| Ok((name.clone(), template::render(value, vars, false)?)))
            .collect::<Result<Vec<_>, String>>()
            .map_err(missing)?;
        let headers = template
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), template::render(value, vars, false)?)))
            .collect::<Result<Vec<_>, String>>()
            .map_err(missing)?;

        Ok(TransportRequest {
            source_id: source.id.clone(),
            method: source.protocol,
            url,
            params,
            headers,
        })
    }
}

fn format_date(
    source: &FinancialSource,
    date: NaiveDate,
    pattern: &str,
) -> Result<String, SeriesError> {
    let mut out = String::new();
    write!(out, "{}", date.format(pattern)).map_err(|_| {
        SeriesError::config(format!(
            "{}: date pattern {:?} cannot format a calendar date",
            source.id, pattern
        ))
    })?;
    Ok(out)
}

impl SourceAdapter for TemplateAdapter {
    fn history_request(
        &self,
        source: &FinancialSource,
        params: &DownloadParameters,
        window: DateRange,
    ) -> Result<TransportRequest, SeriesError> {
        let template = &source.history.request;
        let end = if template.end_exclusive {
            window
                .end()
                .checked_add_days(Days::new(1))
                .ok_or_else(|| SeriesError::validation("window end out of calendar range"))?
        } else {
            window.end()
        };

        let mut vars: BTreeMap<&str, String> = params
            .extra()
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string()))
            .collect();
        vars.insert("code", params.instrument().code().to_string());
        vars.insert("start", format_date(source, window.start(), &template.date_format)?);
        vars.insert("end", format_date(source, end, &template.date_format)?);
        vars.insert("granularity", params.granularity().as_str().to_string());

        Self::render(source, template, &vars)
    }

    fn parse_history(
        &self,
        source: &FinancialSource,
        response: &RawResponse,
    ) -> Result<Vec<HistoricalRecord>, SeriesError> {
        parser::decode_history(source, response)
    }

    fn listing_request(
        &self,
        source: &FinancialSource,
        query: &str,
        page_index: u32,
    ) -> Result<TransportRequest, SeriesError> {
        let listing = source.listing.as_ref().ok_or_else(|| {
            SeriesError::validation(format!("source {} has no instrument listing", source.id))
        })?;

        let (offset, page, page_size) = match &listing.paging {
            Some(paging) => (
                page_index as usize * paging.size,
                paging.first_page + page_index,
                paging.size.to_string(),
            ),
            None => (0, page_index, String::new()),
        };

        let vars = BTreeMap::from([
            ("query", query.to_string()),
            ("offset", offset.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size),
        ]);

        Self::render(source, &listing.request, &vars)
    }

    fn parse_listing(
        &self,
        source: &FinancialSource,
        response: &RawResponse,
    ) -> Result<Vec<Instrument>, SeriesError> {
        parser::decode_listing(source, response)
    }
}

/// Source id → adapter, with [`TemplateAdapter`] as the fallback.
#[derive(Clone)]
pub struct AdapterTable {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    fallback: Arc<dyn SourceAdapter>,
}

impl Default for AdapterTable {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(TemplateAdapter),
        }
    }
}

impl AdapterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom adapter, replacing any previous one for the source.
    pub fn register(&mut self, source_id: impl Into<String>, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(source_id.into(), adapter);
    }

    /// Adapter for a source.
    pub fn for_source(&self, source_id: &str) -> Arc<dyn SourceAdapter> {
        self.adapters
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn has_custom(&self, source_id: &str) -> bool {
        self.adapters.contains_key(source_id)
    }
}

impl std::fmt::Debug for AdapterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterTable")
            .field("custom", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
