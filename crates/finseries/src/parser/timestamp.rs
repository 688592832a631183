use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::row::Cell;
use crate::models::midnight_utc;
use crate::source::TimestampFormat;

/// Parse a timestamp cell; `None` if it does not match the format.
///
/// Patterns may describe a date (midnight UTC), a naive date-time (taken
/// as UTC) or a date-time with an offset (converted to UTC).
pub(crate) fn parse_timestamp(format: &TimestampFormat, cell: &Cell<'_>) -> Option<DateTime<Utc>> {
    match format {
        TimestampFormat::Pattern { pattern } => {
            let text = cell.as_text()?;
            let text = text.trim();
            DateTime::parse_from_str(text, pattern)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| NaiveDateTime::parse_from_str(text, pattern).map(|dt| dt.and_utc()))
                .or_else(|_| NaiveDate::parse_from_str(text, pattern).map(midnight_utc))
                .ok()
        }
        TimestampFormat::EpochMillis => DateTime::from_timestamp_millis(cell.as_i64()?),
        TimestampFormat::EpochSeconds => DateTime::from_timestamp(cell.as_i64()?, 0),
    }
}
