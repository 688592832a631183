//! Reference observations used to confirm a source still answers as described.
//!
//! A source may carry an [`ActualityCheck`]: one small, historical request
//! whose answer is known and will not change. Running it (see
//! [`HistoryEngine::check`](crate::HistoryEngine::check)) detects endpoints
//! that moved, changed their payload layout or started returning other data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::capabilities::FinancialSource;
use crate::errors::SeriesError;
use crate::models::{DateRange, ExtraValue, Granularity, Instrument, InstrumentType, UnifiedSeries};

/// One value the reference request must return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValue {
    pub date: NaiveDate,
    /// Value name from the history layout (e.g. "close").
    pub name: String,
    pub value: Decimal,
}

/// Reference request of a source and the values it must yield.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualityCheck {
    /// Instrument code to download.
    pub code: String,

    /// Defaults to the first type the source serves.
    #[serde(default)]
    pub instrument_type: Option<InstrumentType>,

    /// Defaults to the first granularity the source supports.
    #[serde(default)]
    pub granularity: Option<Granularity>,

    pub start: NaiveDate,
    pub end: NaiveDate,

    /// Extra request fields as text, parsed by their declared kind.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,

    /// When set, the listing for this query must return at least one entry.
    #[serde(default)]
    pub listing_query: Option<String>,

    pub expected: Vec<ExpectedValue>,
}

impl ActualityCheck {
    pub(crate) fn validate(&self, source: &FinancialSource) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("actuality check has no instrument code".to_string());
        }
        if self.start > self.end {
            return Err(format!(
                "actuality check starts {} after its end {}",
                self.start, self.end
            ));
        }
        if self.expected.is_empty() {
            return Err("actuality check expects no values".to_string());
        }
        if let Some(instrument_type) = self.instrument_type {
            if !source.supports_instrument_type(instrument_type) {
                return Err(format!("actuality check uses unserved type {:?}", instrument_type));
            }
        }
        if let Some(granularity) = self.granularity {
            if !source.supports_granularity(granularity) {
                return Err(format!("actuality check uses unsupported granularity {}", granularity));
            }
        }
        if self.listing_query.is_some() && source.listing.is_none() {
            return Err("actuality check queries a listing the source does not have".to_string());
        }
        for (name, raw) in &self.extra {
            match source.extra_field(name) {
                Some(spec) if spec.kind.parse(raw).is_some() => {}
                Some(spec) => {
                    return Err(format!(
                        "actuality check value {:?} of '{}' is not a valid {:?}",
                        raw, name, spec.kind
                    ))
                }
                None => return Err(format!("actuality check sets unknown extra field '{}'", name)),
            }
        }
        for expected in &self.expected {
            if expected.date < self.start || expected.date > self.end {
                return Err(format!(
                    "actuality check expects {} outside {}..={}",
                    expected.date, self.start, self.end
                ));
            }
            if !source.history.layout.values.iter().any(|spec| spec.name == expected.name) {
                return Err(format!("actuality check expects unknown value '{}'", expected.name));
            }
        }
        Ok(())
    }

    pub fn instrument(&self, source: &FinancialSource) -> Instrument {
        let instrument_type = self
            .instrument_type
            .or_else(|| source.instrument_types.first().copied())
            .unwrap_or_default();
        Instrument::new(&source.id, &self.code, &self.code, instrument_type)
    }

    pub fn range(&self) -> Result<DateRange, SeriesError> {
        DateRange::new(self.start, self.end)
    }

    pub fn granularity(&self, source: &FinancialSource) -> Result<Granularity, SeriesError> {
        self.granularity
            .or_else(|| source.granularities.first().copied())
            .ok_or_else(|| SeriesError::config(format!("{}: no supported granularities", source.id)))
    }

    /// Extra fields typed according to the source schema.
    pub fn extra(&self, source: &FinancialSource) -> Result<BTreeMap<String, ExtraValue>, SeriesError> {
        self.extra
            .iter()
            .map(|(name, raw)| {
                source
                    .extra_field(name)
                    .and_then(|spec| spec.kind.parse(raw))
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| {
                        SeriesError::config(format!(
                            "{}: invalid actuality check value for '{}'",
                            source.id, name
                        ))
                    })
            })
            .collect()
    }

    /// Compare a downloaded series with the expected values.
    ///
    /// Values compare numerically, so `27` matches `27.0000`.
    pub fn verify(&self, source_id: &str, series: &UnifiedSeries) -> Result<(), SeriesError> {
        let fail = |message: String| {
            Err(SeriesError::ActualityCheckFailed {
                source_id: source_id.to_string(),
                message,
            })
        };

        for expected in &self.expected {
            let Some(record) = series.iter().find(|record| record.date() == expected.date) else {
                return fail(format!("{} has no record on {}", self.code, expected.date));
            };
            match record.value(&expected.name) {
                Some(actual) if actual == expected.value => {}
                Some(actual) => {
                    return fail(format!(
                        "{} {} on {} is {}, expected {}",
                        self.code, expected.name, expected.date, actual, expected.value
                    ))
                }
                None => {
                    return fail(format!(
                        "{} has no '{}' on {}",
                        self.code, expected.name, expected.date
                    ))
                }
            }
        }
        Ok(())
    }
}
