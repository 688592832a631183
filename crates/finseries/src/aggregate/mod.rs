//! Merging per-window results into one series.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::SeriesError;
use crate::models::{DateRange, HistoricalRecord, HistoryOutcome, UnifiedSeries, WindowGap};

/// Which record survives when windows report the same timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupPolicy {
    /// The record from the later window (or later in the payload) wins.
    #[default]
    LastWindowWins,
    /// The first record seen wins.
    FirstWindowWins,
    /// Identical duplicates collapse; differing ones are an integrity error.
    Strict,
}

/// Parsed records of one window, or why the window has none.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowRecords {
    pub index: usize,
    pub window: DateRange,
    pub records: Result<Vec<HistoricalRecord>, SeriesError>,
}

/// Merges window results into a [`HistoryOutcome`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoryAggregator {
    policy: DedupPolicy,
}

impl HistoryAggregator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self { policy }
    }

    /// Merge window results.
    ///
    /// Records are ordered by timestamp, duplicates resolved by the dedup
    /// policy, and failed windows reported as gaps. Fails if every window
    /// failed, or if a window carries an integrity or cancellation error.
    pub fn merge(
        &self,
        source_id: &str,
        mut windows: Vec<WindowRecords>,
    ) -> Result<HistoryOutcome, SeriesError> {
        windows.sort_by_key(|window| window.index);
        let window_count = windows.len();

        let mut gaps = Vec::new();
        let mut records = Vec::new();
        for window in windows {
            match window.records {
                Ok(chunk) => records.extend(chunk),
                Err(error @ (SeriesError::Integrity { .. } | SeriesError::Cancelled { .. })) => {
                    return Err(error)
                }
                Err(error) => gaps.push(WindowGap {
                    window: window.window,
                    error,
                }),
            }
        }

        if window_count > 0 && gaps.len() == window_count {
            warn!("{}: all {} windows failed", source_id, window_count);
            return Err(SeriesError::AllWindowsFailed {
                source_id: source_id.to_string(),
                gaps,
            });
        }

        // Stable: equal timestamps keep window order.
        records.sort_by_key(|record| record.timestamp);
        let records = self.dedup(source_id, records)?;
        let series = UnifiedSeries::from_ordered(records)?;

        info!(
            "{}: merged {} records from {} windows ({} gaps)",
            source_id,
            series.len(),
            window_count,
            gaps.len()
        );

        if gaps.is_empty() {
            Ok(HistoryOutcome::Complete(series))
        } else {
            Ok(HistoryOutcome::Partial { series, gaps })
        }
    }

    fn dedup(
        &self,
        source_id: &str,
        records: Vec<HistoricalRecord>,
    ) -> Result<Vec<HistoricalRecord>, SeriesError> {
        let mut merged: Vec<HistoricalRecord> = Vec::with_capacity(records.len());

        for record in records {
            let Some(previous) = merged.last_mut() else {
                merged.push(record);
                continue;
            };
            if previous.timestamp != record.timestamp {
                merged.push(record);
                continue;
            }

            if *previous == record {
                continue;
            }
            match self.policy {
                DedupPolicy::LastWindowWins => {
                    debug!(
                        "{}: conflicting records at {}, keeping the later one",
                        source_id, record.timestamp
                    );
                    *previous = record;
                }
                DedupPolicy::FirstWindowWins => {
                    debug!(
                        "{}: conflicting records at {}, keeping the earlier one",
                        source_id, record.timestamp
                    );
                }
                DedupPolicy::Strict => {
                    return Err(SeriesError::Integrity {
                        message: format!(
                            "{}: conflicting records at {}: {:?} vs {:?}",
                            source_id, record.timestamp, previous.values, record.values
                        ),
                    });
                }
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn record(day: u32, close: Decimal) -> HistoricalRecord {
        HistoricalRecord::on_date(date(day), "close", close)
    }

    fn window(index: usize, start: u32, end: u32, records: Vec<HistoricalRecord>) -> WindowRecords {
        WindowRecords {
            index,
            window: DateRange::new(date(start), date(end)).unwrap(),
            records: Ok(records),
        }
    }

    fn failed(index: usize, start: u32, end: u32) -> WindowRecords {
        WindowRecords {
            index,
            window: DateRange::new(date(start), date(end)).unwrap(),
            records: Err(SeriesError::SourceUnavailable {
                source_id: "TEST".to_string(),
                attempts: 3,
                last_error: TransportError::Timeout,
            }),
        }
    }

    fn closes(outcome: &HistoryOutcome) -> Vec<Decimal> {
        outcome
            .series()
            .iter()
            .filter_map(|r| r.value("close"))
            .collect()
    }

    #[test]
    fn test_merge_orders_across_windows() {
        let windows = vec![
            window(1, 11, 20, vec![record(12, dec!(3)), record(11, dec!(2))]),
            window(0, 1, 10, vec![record(1, dec!(1))]),
        ];
        let outcome = HistoryAggregator::default().merge("TEST", windows).unwrap();
        assert!(!outcome.is_partial());
        assert_eq!(closes(&outcome), vec![dec!(1), dec!(2), dec!(3)]);
    }

    #[test]
    fn test_last_window_wins() {
        let windows = vec![
            window(0, 1, 10, vec![record(10, dec!(1))]),
            window(1, 10, 20, vec![record(10, dec!(2))]),
        ];
        let outcome = HistoryAggregator::new(DedupPolicy::LastWindowWins)
            .merge("TEST", windows)
            .unwrap();
        assert_eq!(closes(&outcome), vec![dec!(2)]);
    }

    #[test]
    fn test_first_window_wins() {
        let windows = vec![
            window(1, 10, 20, vec![record(10, dec!(2))]),
            window(0, 1, 10, vec![record(10, dec!(1))]),
        ];
        let outcome = HistoryAggregator::new(DedupPolicy::FirstWindowWins)
            .merge("TEST", windows)
            .unwrap();
        assert_eq!(closes(&outcome), vec![dec!(1)]);
    }

    #[test]
    fn test_strict_allows_identical_duplicates_only() {
        let aggregator = HistoryAggregator::new(DedupPolicy::Strict);

        let identical = vec![
            window(0, 1, 10, vec![record(10, dec!(1))]),
            window(1, 10, 20, vec![record(10, dec!(1))]),
        ];
        assert_eq!(aggregator.merge("TEST", identical).unwrap().series().len(), 1);

        let conflicting = vec![
            window(0, 1, 10, vec![record(10, dec!(1))]),
            window(1, 10, 20, vec![record(10, dec!(2))]),
        ];
        assert!(matches!(
            aggregator.merge("TEST", conflicting),
            Err(SeriesError::Integrity { .. })
        ));
    }

    #[test]
    fn test_failed_window_becomes_gap() {
        let windows = vec![
            window(0, 1, 10, vec![record(1, dec!(1))]),
            failed(1, 11, 20),
            window(2, 21, 30, vec![record(21, dec!(3))]),
        ];
        let outcome = HistoryAggregator::default().merge("TEST", windows).unwrap();

        assert!(outcome.is_partial());
        assert_eq!(outcome.gaps().len(), 1);
        assert_eq!(outcome.gaps()[0].window.start(), date(11));
        assert_eq!(closes(&outcome), vec![dec!(1), dec!(3)]);
    }

    #[test]
    fn test_all_windows_failed() {
        let windows = vec![failed(0, 1, 10), failed(1, 11, 20)];
        let result = HistoryAggregator::default().merge("TEST", windows);
        assert!(matches!(
            result,
            Err(SeriesError::AllWindowsFailed { ref gaps, .. }) if gaps.len() == 2
        ));
    }

    #[test]
    fn test_cancellation_aborts_merge() {
        let windows = vec![
            window(0, 1, 10, vec![record(1, dec!(1))]),
            WindowRecords {
                index: 1,
                window: DateRange::new(date(11), date(20)).unwrap(),
                records: Err(SeriesError::Cancelled {
                    reason: "stop".to_string(),
                }),
            },
        ];
        assert!(matches!(
            HistoryAggregator::default().merge("TEST", windows),
            Err(SeriesError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_no_windows_is_empty_complete() {
        let outcome = HistoryAggregator::default().merge("TEST", Vec::new()).unwrap();
        assert!(!outcome.is_partial());
        assert!(outcome.series().is_empty());
    }
}
