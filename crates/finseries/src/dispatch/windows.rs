//! Splitting a requested range into source-sized windows.

use chrono::Days;

use crate::models::DateRange;

/// Number of windows [`partition`] produces for `range`.
pub fn window_count(range: DateRange, max_window_days: Option<u32>) -> usize {
    match max_window_days {
        Some(max) if max > 0 => {
            let days = range.days().max(1) as u64;
            days.div_ceil(u64::from(max)) as usize
        }
        _ => 1,
    }
}

/// Split `range` into consecutive windows of at most `max_window_days` days.
///
/// Windows are in date order, gap-free and non-overlapping; only the last
/// may be shorter. `None` (or zero) keeps the range whole.
pub fn partition(range: DateRange, max_window_days: Option<u32>) -> Vec<DateRange> {
    let Some(max) = max_window_days.filter(|max| *max > 0) else {
        return vec![range];
    };

    let mut windows = Vec::with_capacity(window_count(range, max_window_days));
    let mut start = range.start();
    loop {
        let end = start
            .checked_add_days(Days::new(u64::from(max) - 1))
            .map_or(range.end(), |end| end.min(range.end()));
        windows.push(DateRange::new(start, end).unwrap_or(DateRange::day(start)));

        match end.succ_opt() {
            Some(next) if end < range.end() => start = next,
            _ => break,
        }
    }
    windows
}
