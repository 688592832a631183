//! Source capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a financial data
//! source supports, how it must be called and how it should be rate-limited.

use std::collections::HashSet;
use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::actuality::ActualityCheck;
use super::layout::{InstrumentLayout, NumberFormat, RecordLayout, TimestampFormat};
use crate::adapter::template::placeholders;
use crate::errors::SeriesError;
use crate::models::{ExtraValue, Granularity, InstrumentType};

/// Placeholders every history request template may use.
pub const HISTORY_PLACEHOLDERS: &[&str] = &["code", "start", "end", "granularity"];

/// Placeholders every listing request template may use.
pub const LISTING_PLACEHOLDERS: &[&str] = &["query", "offset", "page", "page_size"];

/// How requests reach the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolFamily {
    /// Parameters sent as a URL query string.
    #[default]
    HttpGet,
    /// Parameters sent as an `application/x-www-form-urlencoded` body.
    HttpPostForm,
}

/// Payload encoding tag; selects the decoder in [`crate::parser`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadEncoding {
    /// Structured-text tree (XML elements and attributes).
    Xml,
    /// Delimited-record table with a header row.
    Delimited {
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    /// Array of tagged-field JSON objects.
    TaggedJson,
    /// JSON block with parallel `columns` and `data` arrays.
    ColumnarJson,
}

fn default_delimiter() -> char {
    ','
}

/// Rate limiting configuration for a source.
///
/// Controls how aggressively we can call a source to avoid hitting its
/// limits and getting blocked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Sustained requests allowed per second.
    pub requests_per_second: f64,

    /// Maximum burst above the sustained rate.
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst: 5,
        }
    }
}

impl RateLimit {
    /// Number of concurrent workers for this source.
    ///
    /// Never more than the burst nor more than one second's worth of
    /// requests, so a full pool cannot outrun the token bucket.
    pub fn worker_pool_size(&self) -> usize {
        let per_second = self.requests_per_second.ceil().max(1.0) as usize;
        per_second.min(self.burst.max(1) as usize)
    }
}

/// Request shape shared by history and listing endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// URL, may contain `{placeholder}`s (values are percent-encoded).
    pub url: String,

    /// Ordered name/template pairs sent as query string or form body.
    #[serde(default)]
    pub query: Vec<(String, String)>,

    /// Extra headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// chrono `strftime` pattern for `{start}` / `{end}`.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// The source treats `{end}` as exclusive; the day after the window is sent.
    #[serde(default)]
    pub end_exclusive: bool,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl RequestTemplate {
    fn all_templates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str())
            .chain(self.query.iter().map(|(_, value)| value.as_str()))
            .chain(self.headers.iter().map(|(_, value)| value.as_str()))
    }

    /// True if any part of the request substitutes `{name}`.
    pub fn uses(&self, name: &str) -> bool {
        self.all_templates()
            .any(|template| placeholders(template).any(|p| p == name))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEndpoint {
    pub request: RequestTemplate,
    pub layout: RecordLayout,
}

/// Paging of an instrument listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// Entries per full page; a shorter page ends the listing.
    pub size: usize,

    /// Value of `{page}` for the first page.
    #[serde(default)]
    pub first_page: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingEndpoint {
    pub request: RequestTemplate,

    /// Overrides the source encoding when the listing uses another format.
    #[serde(default)]
    pub encoding: Option<PayloadEncoding>,

    pub layout: InstrumentLayout,

    #[serde(default)]
    pub paging: Option<PageSpec>,
}

/// Type of a source-specific extra request field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtraKind {
    Text,
    Integer,
    Decimal,
    Bool,
}

impl ExtraKind {
    /// Parse a textual default into a typed value.
    pub fn parse(&self, raw: &str) -> Option<ExtraValue> {
        match self {
            Self::Text => Some(ExtraValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse().ok().map(ExtraValue::Integer),
            Self::Decimal => raw.trim().parse().ok().map(ExtraValue::Decimal),
            Self::Bool => raw.trim().parse().ok().map(ExtraValue::Bool),
        }
    }
}

/// Schema entry for one extra request field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFieldSpec {
    pub name: String,

    pub kind: ExtraKind,

    #[serde(default)]
    pub required: bool,

    /// Textual default, parsed according to `kind`.
    #[serde(default)]
    pub default: Option<String>,

    /// Permitted values (compared on their textual form); empty = any.
    #[serde(default)]
    pub allowed: Vec<String>,
}

/// Describes a financial data source.
///
/// Loaded once from configuration and shared read-only by every component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialSource {
    /// Unique identifier (e.g. "CBR", "MOEX").
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub protocol: ProtocolFamily,

    pub encoding: PayloadEncoding,

    /// Longest date window one request may cover; `None` = unlimited.
    #[serde(default)]
    pub max_window_days: Option<u32>,

    pub granularities: Vec<Granularity>,

    pub instrument_types: Vec<InstrumentType>,

    #[serde(default)]
    pub rate_limit: RateLimit,

    #[serde(default)]
    pub number_format: NumberFormat,

    /// Charset label of text payloads (e.g. "windows-1251").
    #[serde(default = "default_charset")]
    pub charset: String,

    pub history: HistoryEndpoint,

    #[serde(default)]
    pub listing: Option<ListingEndpoint>,

    #[serde(default)]
    pub extra_fields: Vec<ExtraFieldSpec>,

    /// Move a start date between December 25 and January 10 back to
    /// December 24, for sources that return nothing over the holidays.
    #[serde(default)]
    pub adjust_holiday_start: bool,

    /// Reference request used by [`HistoryEngine::check`](crate::HistoryEngine::check).
    #[serde(default)]
    pub check: Option<ActualityCheck>,
}

fn default_charset() -> String {
    "utf-8".to_string()
}

impl FinancialSource {
    pub fn supports_granularity(&self, granularity: Granularity) -> bool {
        self.granularities.contains(&granularity)
    }

    pub fn supports_instrument_type(&self, instrument_type: InstrumentType) -> bool {
        self.instrument_types.contains(&instrument_type)
    }

    pub fn extra_field(&self, name: &str) -> Option<&ExtraFieldSpec> {
        self.extra_fields.iter().find(|spec| spec.name == name)
    }

    /// Encoding of listing payloads.
    pub fn listing_encoding(&self) -> Option<&PayloadEncoding> {
        self.listing
            .as_ref()
            .map(|listing| listing.encoding.as_ref().unwrap_or(&self.encoding))
    }

    /// Check the descriptor for defects that would otherwise surface
    /// as confusing failures at request time.
    pub fn validate(&self) -> Result<(), SeriesError> {
        let fail = |message: String| Err(SeriesError::config(format!("{}: {}", self.id, message)));

        if self.id.trim().is_empty() {
            return Err(SeriesError::config("source id is empty"));
        }
        if self.granularities.is_empty() {
            return fail("no supported granularities".to_string());
        }
        if self.instrument_types.is_empty() {
            return fail("no supported instrument types".to_string());
        }
        if self.max_window_days == Some(0) {
            return fail("max_window_days must be positive".to_string());
        }
        let rate = &self.rate_limit;
        if !(rate.requests_per_second.is_finite() && rate.requests_per_second > 0.0) {
            return fail(format!(
                "requests_per_second must be positive, got {}",
                rate.requests_per_second
            ));
        }
        if rate.burst == 0 {
            return fail("burst must be at least 1".to_string());
        }
        if Some(self.number_format.decimal_separator) == self.number_format.thousands_separator {
            return fail("decimal and thousands separators are identical".to_string());
        }
        if self.history.layout.values.is_empty() {
            return fail("history layout declares no values".to_string());
        }
        if let TimestampFormat::Pattern { pattern } = &self.history.layout.timestamp.format {
            check_strftime(pattern).or_else(|message| fail(message))?;
        }

        let mut extra_names = HashSet::new();
        for spec in &self.extra_fields {
            if !extra_names.insert(spec.name.as_str()) {
                return fail(format!("extra field '{}' declared twice", spec.name));
            }
            if HISTORY_PLACEHOLDERS.contains(&spec.name.as_str()) {
                return fail(format!("extra field '{}' shadows a built-in placeholder", spec.name));
            }
            if let Some(default) = &spec.default {
                if spec.kind.parse(default).is_none() {
                    return fail(format!(
                        "default {:?} of extra field '{}' is not a valid {:?}",
                        default, spec.name, spec.kind
                    ));
                }
            }
            if !spec.required && spec.default.is_none() && self.history.request.uses(&spec.name) {
                return fail(format!(
                    "extra field '{}' is used by the history request but is optional without a default",
                    spec.name
                ));
            }
        }

        check_request(&self.history.request, HISTORY_PLACEHOLDERS, &extra_names)
            .or_else(|message| fail(format!("history request: {}", message)))?;

        if let Some(listing) = &self.listing {
            check_request(&listing.request, LISTING_PLACEHOLDERS, &HashSet::new())
                .or_else(|message| fail(format!("listing request: {}", message)))?;
            if listing.paging.as_ref().is_some_and(|paging| paging.size == 0) {
                return fail("listing page size must be positive".to_string());
            }
        }

        if let Some(check) = &self.check {
            check.validate(self).or_else(|message| fail(message))?;
        }

        Ok(())
    }
}

fn check_strftime(pattern: &str) -> Result<(), String> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date pattern {:?}", pattern));
    }
    Ok(())
}

fn check_request(
    request: &RequestTemplate,
    builtin: &[&str],
    extras: &HashSet<&str>,
) -> Result<(), String> {
    check_strftime(&request.date_format)?;
    // request dates carry no time of day
    let mut sample = String::new();
    if write!(sample, "{}", NaiveDate::MIN.format(&request.date_format)).is_err() {
        return Err(format!(
            "date format {:?} needs more than a calendar date",
            request.date_format
        ));
    }
    for template in request.all_templates() {
        for name in placeholders(template) {
            if !builtin.contains(&name) && !extras.contains(name) {
                return Err(format!("unknown placeholder {{{}}} in {:?}", name, template));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::layout::{FieldSpec, TimestampSpec};

    fn minimal_source(id: &str) -> FinancialSource {
        FinancialSource {
            id: id.to_string(),
            name: id.to_string(),
            protocol: ProtocolFamily::HttpGet,
            encoding: PayloadEncoding::TaggedJson,
            max_window_days: Some(30),
            granularities: vec![Granularity::Daily],
            instrument_types: vec![InstrumentType::Index],
            rate_limit: RateLimit::default(),
            number_format: NumberFormat::default(),
            charset: default_charset(),
            history: HistoryEndpoint {
                request: RequestTemplate {
                    url: "https://example.test/{code}".to_string(),
                    query: vec![
                        ("from".to_string(), "{start}".to_string()),
                        ("to".to_string(), "{end}".to_string()),
                    ],
                    headers: Vec::new(),
                    date_format: default_date_format(),
                    end_exclusive: false,
                },
                layout: RecordLayout {
                    records: String::new(),
                    timestamp: TimestampSpec {
                        field: "date".to_string(),
                        format: TimestampFormat::Pattern {
                            pattern: "%Y-%m-%d".to_string(),
                        },
                    },
                    values: vec![FieldSpec {
                        name: "close".to_string(),
                        field: "value".to_string(),
                        fallback: Vec::new(),
                        required: true,
                        default: None,
                    }],
                    metadata: Vec::new(),
                    nominal: None,
                    quality: None,
                    empty_is_error: false,
                },
            },
            listing: None,
            extra_fields: Vec::new(),
            adjust_holiday_start: false,
            check: None,
        }
    }

    #[test]
    fn test_worker_pool_size_bounded_by_rate_and_burst() {
        let slow = RateLimit {
            requests_per_second: 0.5,
            burst: 10,
        };
        assert_eq!(slow.worker_pool_size(), 1);

        let bursty = RateLimit {
            requests_per_second: 20.0,
            burst: 4,
        };
        assert_eq!(bursty.worker_pool_size(), 4);

        let steady = RateLimit {
            requests_per_second: 2.5,
            burst: 10,
        };
        assert_eq!(steady.worker_pool_size(), 3);
    }

    #[test]
    fn test_minimal_source_is_valid() {
        assert!(minimal_source("TEST").validate().is_ok());
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut source = minimal_source("TEST");
        source.history.request.url = "https://example.test/{board}/{code}".to_string();
        let error = source.validate().unwrap_err();
        assert!(matches!(error, SeriesError::Config { .. }));
        assert!(error.to_string().contains("{board}"));
    }

    #[test]
    fn test_extra_field_enables_placeholder() {
        let mut source = minimal_source("TEST");
        source.history.request.url = "https://example.test/{board}/{code}".to_string();
        source.extra_fields.push(ExtraFieldSpec {
            name: "board".to_string(),
            kind: ExtraKind::Text,
            required: false,
            default: Some("TQBR".to_string()),
            allowed: Vec::new(),
        });
        assert!(source.validate().is_ok());
    }

    #[test]
    fn test_optional_placeholder_without_default_rejected() {
        let mut source = minimal_source("TEST");
        source.history.request.url = "https://example.test/{board}/{code}".to_string();
        source.extra_fields.push(ExtraFieldSpec {
            name: "board".to_string(),
            kind: ExtraKind::Text,
            required: false,
            default: None,
            allowed: Vec::new(),
        });
        let error = source.validate().unwrap_err();
        assert!(matches!(error, SeriesError::Config { .. }));
        assert!(error.to_string().contains("'board'"));

        source.extra_fields[0].required = true;
        assert!(source.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut source = minimal_source("TEST");
        source.max_window_days = Some(0);
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_bad_extra_default_rejected() {
        let mut source = minimal_source("TEST");
        source.extra_fields.push(ExtraFieldSpec {
            name: "limit".to_string(),
            kind: ExtraKind::Integer,
            required: false,
            default: Some("lots".to_string()),
            allowed: Vec::new(),
        });
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_request_date_format_with_time_rejected() {
        let mut source = minimal_source("TEST");
        source.history.request.date_format = "%Y-%m-%dT%H:%M".to_string();
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_identical_separators_rejected() {
        let mut source = minimal_source("TEST");
        source.number_format.thousands_separator = Some('.');
        assert!(source.validate().is_err());
    }
}
