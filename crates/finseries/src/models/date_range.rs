use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::SeriesError;

/// Calendar date range with **both ends inclusive**.
///
/// Sources that expect an exclusive end date get `end + 1 day` substituted
/// into their request template; inside the crate every range is inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = SeriesError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SeriesError> {
        if start > end {
            return Err(SeriesError::validation(format!(
                "date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, always at least 1.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Move a start that falls in the year-end holidays back to December 24.
    ///
    /// Starts from December 25 to January 10 would return an empty first
    /// window on sources that publish nothing over the holidays. The end
    /// date is never touched.
    pub fn holiday_adjusted(self) -> Self {
        let start = self.start;
        let adjusted = match (start.month(), start.day()) {
            (12, day) if day >= 25 => NaiveDate::from_ymd_opt(start.year(), 12, 24),
            (1, day) if day <= 10 => NaiveDate::from_ymd_opt(start.year() - 1, 12, 24),
            _ => None,
        };
        Self {
            start: adjusted.unwrap_or(start),
            end: self.end,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
