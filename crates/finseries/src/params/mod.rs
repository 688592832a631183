//! Fail-fast construction of [`DownloadParameters`].

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::dispatch::window_count;
use crate::errors::SeriesError;
use crate::models::{DateRange, DownloadParameters, ExtraValue, Granularity, Instrument};
use crate::source::{ExtraFieldSpec, ExtraKind, FinancialSource, SourceCatalog};

/// Validates caller intent against a source's capabilities.
///
/// The only way to obtain [`DownloadParameters`]; nothing it rejects ever
/// reaches the network.
#[derive(Clone, Debug)]
pub struct DownloadParametersFactory {
    catalog: Arc<SourceCatalog>,
    max_windows: usize,
}

impl DownloadParametersFactory {
    pub fn new(catalog: Arc<SourceCatalog>, max_windows: usize) -> Self {
        Self {
            catalog,
            max_windows,
        }
    }

    /// Build parameters for downloading `instrument` over `range`.
    ///
    /// # Errors
    ///
    /// - [`SeriesError::UnknownSource`] if the instrument's source is not registered
    /// - [`SeriesError::Validation`] for an unsupported instrument type or
    ///   granularity, an extra field that does not match the source's schema,
    ///   or a range needing more than `max_windows` requests
    pub fn build(
        &self,
        instrument: &Instrument,
        range: DateRange,
        granularity: Granularity,
        extra: BTreeMap<String, ExtraValue>,
    ) -> Result<DownloadParameters, SeriesError> {
        let source = self.catalog.describe(instrument.source_id())?;

        if !source.supports_instrument_type(instrument.instrument_type()) {
            return Err(SeriesError::validation(format!(
                "{} does not serve {:?} instruments",
                source.id,
                instrument.instrument_type()
            )));
        }
        if !source.supports_granularity(granularity) {
            return Err(SeriesError::validation(format!(
                "{} does not support {} granularity",
                source.id, granularity
            )));
        }

        if range.start() > range.end() {
            return Err(SeriesError::validation(format!(
                "date range start {} is after end {}",
                range.start(),
                range.end()
            )));
        }
        let range = if source.adjust_holiday_start {
            let adjusted = range.holiday_adjusted();
            if adjusted != range {
                debug!("{}: moved holiday start {} to {}", source.id, range, adjusted);
            }
            adjusted
        } else {
            range
        };

        let windows = window_count(range, source.max_window_days);
        if windows > self.max_windows {
            return Err(SeriesError::validation(format!(
                "range {} needs {} requests to {}, more than the limit of {}",
                range, windows, source.id, self.max_windows
            )));
        }

        let extra = validate_extra(&source, extra)?;

        debug!(
            "Built parameters for {}:{} over {} ({} windows)",
            source.id,
            instrument.code(),
            range,
            windows
        );

        Ok(DownloadParameters {
            instrument: instrument.clone(),
            range,
            granularity,
            extra,
        })
    }
}

fn validate_extra(
    source: &FinancialSource,
    mut extra: BTreeMap<String, ExtraValue>,
) -> Result<BTreeMap<String, ExtraValue>, SeriesError> {
    if let Some(unknown) = extra.keys().find(|name| source.extra_field(name).is_none()) {
        return Err(SeriesError::validation(format!(
            "{} has no extra field '{}'",
            source.id, unknown
        )));
    }

    let mut validated = BTreeMap::new();
    for spec in &source.extra_fields {
        let value = match extra.remove(&spec.name) {
            Some(value) => coerce(spec, value)?,
            None => match &spec.default {
                Some(default) => spec.kind.parse(default).ok_or_else(|| {
                    SeriesError::config(format!(
                        "{}: invalid default for extra field '{}'",
                        source.id, spec.name
                    ))
                })?,
                None if spec.required => {
                    return Err(SeriesError::validation(format!(
                        "{} requires extra field '{}'",
                        source.id, spec.name
                    )))
                }
                None => continue,
            },
        };

        if !spec.allowed.is_empty() && !spec.allowed.contains(&value.to_string()) {
            return Err(SeriesError::validation(format!(
                "extra field '{}' must be one of {:?}, got '{}'",
                spec.name, spec.allowed, value
            )));
        }
        validated.insert(spec.name.clone(), value);
    }

    Ok(validated)
}

/// Check a value against its declared kind; integers widen to decimals.
fn coerce(spec: &ExtraFieldSpec, value: ExtraValue) -> Result<ExtraValue, SeriesError> {
    match (spec.kind, value) {
        (ExtraKind::Text, value @ ExtraValue::Text(_))
        | (ExtraKind::Integer, value @ ExtraValue::Integer(_))
        | (ExtraKind::Decimal, value @ ExtraValue::Decimal(_))
        | (ExtraKind::Bool, value @ ExtraValue::Bool(_)) => Ok(value),
        (ExtraKind::Decimal, ExtraValue::Integer(number)) => Ok(ExtraValue::Decimal(number.into())),
        (kind, value) => Err(SeriesError::validation(format!(
            "extra field '{}' expects {:?}, got {}",
            spec.name,
            kind,
            value.type_name()
        ))),
    }
}
