use serde::Serialize;

use super::date_range::DateRange;
use super::record::HistoricalRecord;
use crate::errors::SeriesError;

/// Ordered, duplicate-free sequence of records for one instrument.
///
/// Timestamps are strictly increasing; the only way to build a series is
/// [`UnifiedSeries::from_ordered`], which checks that.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UnifiedSeries {
    records: Vec<HistoricalRecord>,
}

impl UnifiedSeries {
    /// Wrap records that are already ordered, failing with
    /// [`SeriesError::Integrity`] on the first non-increasing timestamp.
    pub fn from_ordered(records: Vec<HistoricalRecord>) -> Result<Self, SeriesError> {
        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[0].timestamp >= pair[1].timestamp)
        {
            return Err(SeriesError::Integrity {
                message: format!(
                    "timestamps not strictly increasing: {} followed by {}",
                    pair[0].timestamp, pair[1].timestamp
                ),
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<HistoricalRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&HistoricalRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&HistoricalRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoricalRecord> {
        self.records.iter()
    }
}

/// A window whose chunk could not be fetched or parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowGap {
    pub window: DateRange,
    pub error: SeriesError,
}

/// Result of a download: either the full series or a partial one with the
/// windows that are missing from it.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryOutcome {
    /// Every window was fetched and parsed.
    Complete(UnifiedSeries),
    /// Some windows failed permanently; `series` covers the others only.
    Partial {
        series: UnifiedSeries,
        gaps: Vec<WindowGap>,
    },
}

impl HistoryOutcome {
    pub fn series(&self) -> &UnifiedSeries {
        match self {
            Self::Complete(series) | Self::Partial { series, .. } => series,
        }
    }

    pub fn into_series(self) -> UnifiedSeries {
        match self {
            Self::Complete(series) | Self::Partial { series, .. } => series,
        }
    }

    /// Unresolved windows, empty for a complete outcome.
    pub fn gaps(&self) -> &[WindowGap] {
        match self {
            Self::Complete(_) => &[],
            Self::Partial { gaps, .. } => gaps,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(day: u32) -> HistoricalRecord {
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        HistoricalRecord::on_date(date, "close", dec!(1))
    }

    #[test]
    fn test_ordered_series_accepted() {
        let series = UnifiedSeries::from_ordered(vec![record(1), record(2), record(5)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.first().map(|r| r.date().to_string()), Some("2024-01-01".into()));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let result = UnifiedSeries::from_ordered(vec![record(1), record(2), record(2)]);
        assert!(matches!(result, Err(SeriesError::Integrity { .. })));
    }

    #[test]
    fn test_descending_rejected() {
        let result = UnifiedSeries::from_ordered(vec![record(3), record(1)]);
        assert!(matches!(result, Err(SeriesError::Integrity { .. })));
    }

    #[test]
    fn test_empty_series_allowed() {
        let series = UnifiedSeries::from_ordered(Vec::new()).unwrap();
        assert!(series.is_empty());
        assert!(!HistoryOutcome::Complete(series).is_partial());
    }
}
