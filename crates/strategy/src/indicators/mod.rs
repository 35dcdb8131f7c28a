pub mod atr;
pub mod extrema;
pub mod pivot;

pub use atr::{true_range, AtrIndicator};
pub use extrema::{prior_extreme, rolling_extreme};
pub use pivot::{confirmed_pivot, latest_pivot, PivotTracker};

#[cfg(test)]
pub(crate) fn test_ohlc(rows: &[(f64, f64, f64, f64)]) -> Vec<common::Bar> {
    use chrono::{Duration, TimeZone, Utc};

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| common::Bar {
            timestamp: start + Duration::hours(4 * i as i64),
            open,
            high,
            low,
            close,
        })
        .collect()
}

/// Bars from `(high, low)` pairs, opening and closing at the midpoint.
#[cfg(test)]
pub(crate) fn test_bars(ranges: &[(f64, f64)]) -> Vec<common::Bar> {
    let rows: Vec<_> = ranges
        .iter()
        .map(|&(high, low)| {
            let mid = (high + low) / 2.0;
            (mid, high, low, mid)
        })
        .collect();
    test_ohlc(&rows)
}
