//! Assertion utilities for testing.
//!
//! This module provides helper functions for checking indicator series
//! invariants and floating-point values.

use total_indicator::series::{round2, IndicatorSeries, INDICATOR_WINDOW};

/// Default epsilon for floating-point comparisons
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// Assert that two floating-point values are approximately equal.
///
/// # Panics
///
/// Panics if the absolute difference between `actual` and `expected` is greater than `epsilon`.
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: Option<f64>) {
    let epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
    let diff = (actual - expected).abs();

    assert!(
        diff <= epsilon,
        "Values not approximately equal: actual = {}, expected = {}, diff = {}, epsilon = {}",
        actual,
        expected,
        diff,
        epsilon
    );
}

/// Assert the structural invariants of a persisted series.
///
/// Months ascend one calendar month at a time, at most one forecast row
/// exists and it is last, one month after the last observed month.
pub fn assert_series_invariants(series: &IndicatorSeries) {
    let records = series.records();
    for pair in records.windows(2) {
        assert_eq!(
            pair[0].month.succ(),
            pair[1].month,
            "Series is not contiguous between {} and {}",
            pair[0].month,
            pair[1].month
        );
    }

    let forecasts: Vec<_> = records.iter().filter(|r| r.is_forecast).collect();
    assert!(forecasts.len() <= 1, "More than one forecast row");
    if let Some(forecast) = forecasts.first() {
        let last = records.last().unwrap();
        assert_eq!(last.month, forecast.month, "Forecast row is not last");
        assert!(forecast.anomaly.is_none(), "Forecast row carries an anomaly");
        let last_observed = series.last_observed().unwrap();
        assert_eq!(last_observed.month.succ(), forecast.month);
    }
}

/// Assert every observed indicator is the trailing mean of stored anomalies
pub fn assert_rolling_window(series: &IndicatorSeries) {
    let anomalies: Vec<f64> = series.observed().map(|r| r.anomaly.unwrap()).collect();
    for (k, record) in series.observed().enumerate() {
        let start = (k + 1).saturating_sub(INDICATOR_WINDOW);
        let window = &anomalies[start..=k];
        let expected = round2(window.iter().sum::<f64>() / window.len() as f64);
        assert_approx_eq(record.indicator, expected, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_approx_eq() {
        assert_approx_eq(1.0, 1.0, None);
        assert_approx_eq(1.0, 1.001, Some(0.01));
    }
}
