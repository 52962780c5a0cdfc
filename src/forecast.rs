//! One-month-ahead forecast row.
//!
//! The forecast row sits one month after the last observed month. It has no
//! anomaly of its own; its indicator is the trailing mean over the latest
//! observed anomalies. Regenerating it replaces the previous row.

use tracing::info;

use crate::error::{IndicatorError, Result};
use crate::indicator::compute_indicator;
use crate::series::{round2, IndicatorSeries, MonthRecord};

/// The forecast row the current observed data calls for
pub fn expected_forecast(series: &IndicatorSeries) -> Option<MonthRecord> {
    let last = series.last_observed()?;
    let anomalies = series.anomalies_through(last.month);
    let indicator = compute_indicator(&anomalies)?;
    Some(MonthRecord::forecast(last.month.succ(), round2(indicator)))
}

/// Whether the series already ends in the forecast its observed data calls for
pub fn forecast_is_valid(series: &IndicatorSeries) -> bool {
    match (series.forecast(), expected_forecast(series)) {
        (Some(current), Some(expected)) => *current == expected,
        _ => false,
    }
}

/// Replace (or add) the trailing forecast row; idempotent
pub fn append_forecast(series: &mut IndicatorSeries) -> Result<MonthRecord> {
    series.remove_forecasts();
    let forecast = expected_forecast(series).ok_or_else(|| IndicatorError::InvariantViolation {
        message: "Cannot forecast a series with no observed months".to_string(),
    })?;
    series.set_forecast(forecast.clone())?;
    info!(
        month = %forecast.month,
        indicator = forecast.indicator,
        "Forecast row generated"
    );
    Ok(forecast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::month::YearMonth;
    use pretty_assertions::assert_eq;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn observed_series(anomalies: &[f64]) -> IndicatorSeries {
        let mut month = ym("2025-01");
        let mut records = Vec::new();
        for &a in anomalies {
            records.push(MonthRecord::observed(month, a, a));
            month = month.succ();
        }
        IndicatorSeries::from_records(records)
    }

    #[test]
    fn test_forecast_follows_last_observed() {
        let mut series = observed_series(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        let forecast = append_forecast(&mut series).unwrap();

        assert_eq!(forecast.month, ym("2025-09"));
        assert_eq!(forecast.anomaly, None);
        // Mean of the last six: 0.3..=0.8
        assert_eq!(forecast.indicator, 0.55);
        assert_eq!(series.forecast(), Some(&forecast));
        assert!(series.validate().is_ok());
    }

    #[test]
    fn test_forecast_is_idempotent() {
        let mut series = observed_series(&[0.9, 0.8, 0.7]);
        append_forecast(&mut series).unwrap();
        let once = series.clone();
        append_forecast(&mut series).unwrap();

        assert_eq!(series, once);
        assert_eq!(series.records().iter().filter(|r| r.is_forecast).count(), 1);
        assert!(forecast_is_valid(&series));
    }

    #[test]
    fn test_stale_forecast_is_replaced() {
        let mut series = observed_series(&[0.9, 0.8]);
        series
            .set_forecast(MonthRecord::forecast(ym("2025-05"), 0.1))
            .unwrap();
        assert!(!forecast_is_valid(&series));

        let forecast = append_forecast(&mut series).unwrap();
        assert_eq!(forecast.month, ym("2025-03"));
        assert_eq!(series.len(), 3);
        assert!(forecast_is_valid(&series));
    }

    #[test]
    fn test_empty_series_cannot_forecast() {
        let mut series = IndicatorSeries::new();
        assert!(append_forecast(&mut series).is_err());
        assert!(!forecast_is_valid(&series));
    }
}
