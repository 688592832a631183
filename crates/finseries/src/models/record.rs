use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observation of an instrument at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    /// Observation instant, normalized to UTC. Daily sources land on midnight.
    pub timestamp: DateTime<Utc>,

    /// Named values (e.g. "close", "rate"); at least one per record.
    pub values: BTreeMap<String, Decimal>,

    /// Optional per-record metadata such as volume or face value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Decimal>,

    /// Data-quality flag reported by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl HistoricalRecord {
    /// Create a record with a single named value.
    pub fn new(timestamp: DateTime<Utc>, name: impl Into<String>, value: Decimal) -> Self {
        let mut values = BTreeMap::new();
        values.insert(name.into(), value);
        Self {
            timestamp,
            values,
            metadata: BTreeMap::new(),
            quality: None,
        }
    }

    /// Create a record dated at midnight UTC of `date`.
    pub fn on_date(date: NaiveDate, name: impl Into<String>, value: Decimal) -> Self {
        Self::new(midnight_utc(date), name, value)
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: Decimal) -> Self {
        self.metadata.insert(name.into(), value);
        self
    }

    pub fn value(&self, name: &str) -> Option<Decimal> {
        self.values.get(name).copied()
    }

    /// Calendar date of the observation in UTC.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Midnight UTC of a calendar date.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
