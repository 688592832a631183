use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use super::date_range::DateRange;
use super::granularity::Granularity;
use super::instrument::Instrument;

/// Value of a source-specific extra request field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Bool(bool),
}

impl ExtraValue {
    /// Type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Decimal(value) => write!(f, "{}", value),
            Self::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ExtraValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ExtraValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Decimal> for ExtraValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for ExtraValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Fully validated request for one instrument's history.
///
/// Built only by [`DownloadParametersFactory`](crate::params::DownloadParametersFactory);
/// immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadParameters {
    pub(crate) instrument: Instrument,
    pub(crate) range: DateRange,
    pub(crate) granularity: Granularity,
    pub(crate) extra: BTreeMap<String, ExtraValue>,
}

impl DownloadParameters {
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn source_id(&self) -> &str {
        self.instrument.source_id()
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Extra fields with schema defaults already applied.
    pub fn extra(&self) -> &BTreeMap<String, ExtraValue> {
        &self.extra
    }
}
