//! Encoding-independent extraction of records and instruments from rows.

use std::borrow::Cow;

use log::debug;
use rust_decimal::Decimal;

use super::number::{json_number, parse_number};
use super::timestamp::parse_timestamp;
use crate::errors::SeriesError;
use crate::models::{HistoricalRecord, Instrument, InstrumentType};
use crate::source::{FieldSpec, FinancialSource, InstrumentLayout, RecordLayout};

/// A single field value as found in the payload.
#[derive(Debug)]
pub(crate) enum Cell<'a> {
    Text(Cow<'a, str>),
    Number(&'a serde_json::Number),
}

impl Cell<'_> {
    pub(crate) fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(text) => Some(Cow::Borrowed(text.as_ref())),
            Self::Number(number) => Some(Cow::Owned(number.to_string())),
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Text(text) => text.trim().parse().ok(),
            Self::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64)),
        }
    }

    fn as_decimal(&self, source: &FinancialSource) -> Option<Decimal> {
        match self {
            Self::Text(text) => parse_number(&source.number_format, text),
            Self::Number(number) => json_number(number),
        }
    }

    fn excerpt(&self) -> String {
        self.as_text().map(Cow::into_owned).unwrap_or_default()
    }
}

/// Field lookup over one row of a decoded payload.
///
/// Blank and null fields are reported as absent.
pub(crate) trait Row {
    fn cell(&self, reference: &str) -> Option<Cell<'_>>;

    /// Short rendering of the row for error messages.
    fn describe(&self) -> String;
}

/// Resolve one numeric field: primary reference, then fallbacks, then the
/// declared default. `Ok(None)` means an optional field with no value.
///
/// The flag is true when the value came from the payload.
fn numeric_field(
    source: &FinancialSource,
    row: &dyn Row,
    spec: &FieldSpec,
) -> Result<Option<(Decimal, bool)>, SeriesError> {
    for reference in spec.candidates() {
        let Some(cell) = row.cell(reference) else {
            continue;
        };
        return match cell.as_decimal(source) {
            Some(value) => Ok(Some((value, true))),
            None => Err(SeriesError::parse(
                &source.id,
                format!("decimal in field '{}'", reference),
                cell.excerpt(),
            )),
        };
    }

    match spec.default {
        Some(default) => Ok(Some((default, false))),
        None if spec.required => Err(SeriesError::parse(
            &source.id,
            format!("value for required field '{}'", spec.field),
            row.describe(),
        )),
        None => Ok(None),
    }
}

/// Build a record from one row.
///
/// Values are multiplied by the unit scale and divided by the row's nominal;
/// defaults and metadata are taken as they are. A row where every value is
/// optional and absent yields `Ok(None)`.
pub(crate) fn extract_record(
    source: &FinancialSource,
    layout: &RecordLayout,
    row: &dyn Row,
) -> Result<Option<HistoricalRecord>, SeriesError> {
    let cell = row.cell(&layout.timestamp.field).ok_or_else(|| {
        SeriesError::parse(
            &source.id,
            format!("timestamp field '{}'", layout.timestamp.field),
            row.describe(),
        )
    })?;
    let timestamp = parse_timestamp(&layout.timestamp.format, &cell).ok_or_else(|| {
        SeriesError::parse(
            &source.id,
            format!("timestamp as {:?}", layout.timestamp.format),
            cell.excerpt(),
        )
    })?;

    let nominal = match &layout.nominal {
        Some(field) => match row.cell(field) {
            Some(cell) => match cell.as_decimal(source) {
                Some(nominal) if !nominal.is_zero() => nominal,
                _ => {
                    return Err(SeriesError::parse(
                        &source.id,
                        format!("non-zero nominal in field '{}'", field),
                        cell.excerpt(),
                    ))
                }
            },
            None => Decimal::ONE,
        },
        None => Decimal::ONE,
    };
    let scale = source.number_format.scale;

    let mut record = HistoricalRecord {
        timestamp,
        values: Default::default(),
        metadata: Default::default(),
        quality: None,
    };

    for spec in &layout.values {
        if let Some((value, from_payload)) = numeric_field(source, row, spec)? {
            let value = if from_payload {
                value
                    .checked_mul(scale)
                    .and_then(|scaled| scaled.checked_div(nominal))
                    .ok_or_else(|| {
                        SeriesError::parse(
                            &source.id,
                            format!("value of '{}' within decimal range", spec.name),
                            format!("{} * {} / {}", value, scale, nominal),
                        )
                    })?
            } else {
                value
            };
            record.values.insert(spec.name.clone(), value);
        }
    }
    for spec in &layout.metadata {
        if let Some((value, _)) = numeric_field(source, row, spec)? {
            record.metadata.insert(spec.name.clone(), value);
        }
    }
    record.quality = layout
        .quality
        .as_ref()
        .and_then(|field| row.cell(field))
        .and_then(|cell| cell.as_text().map(|text| text.trim().to_string()));

    if record.values.is_empty() {
        debug!("{}: skipping row without values at {}", source.id, timestamp);
        return Ok(None);
    }
    Ok(Some(record))
}

/// Build an instrument from one listing row.
pub(crate) fn extract_instrument(
    source: &FinancialSource,
    layout: &InstrumentLayout,
    row: &dyn Row,
) -> Result<Instrument, SeriesError> {
    let text = |field: &str| {
        row.cell(field)
            .and_then(|cell| cell.as_text().map(|text| text.trim().to_string()))
            .filter(|text| !text.is_empty())
    };

    let code = text(&layout.code).ok_or_else(|| {
        SeriesError::parse(
            &source.id,
            format!("instrument code in field '{}'", layout.code),
            row.describe(),
        )
    })?;
    let name = text(&layout.name).unwrap_or_else(|| code.clone());
    let instrument_type = layout
        .instrument_type
        .as_deref()
        .and_then(text)
        .and_then(|tag| InstrumentType::from_tag(&tag))
        .unwrap_or(layout.default_type);

    let instrument = Instrument::new(&source.id, code, name, instrument_type);
    Ok(match layout.currency.as_deref().and_then(text) {
        Some(currency) => instrument.with_currency(currency),
        None => instrument,
    })
}
