//! Indicator calculation.
//!
//! The anomaly for a month is the mean of every defined grid cell in the
//! regional window. The indicator is the mean of the last
//! [`INDICATOR_WINDOW`] anomalies up to and including that month, using
//! whatever shorter history exists at the start of the series. Both values are
//! rounded to two decimals before they enter the series, and later windows are
//! computed from the rounded values, so recomputation is stable.

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::error::{IndicatorError, Result};
use crate::gateway::MonthlyGrid;
use crate::month::YearMonth;
use crate::region::GridWindow;
use crate::series::{round2, IndicatorSeries, MonthRecord, INDICATOR_WINDOW};

/// Mean of the defined (finite) cells, `None` when every cell is undefined
pub fn mean_defined(field: &Array2<f32>) -> Option<f64> {
    let (sum, count) = field
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(sum, count), &v| (sum + v as f64, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Regional mean anomaly for one month of the remote grid
pub fn compute_anomaly(grid: &dyn MonthlyGrid, month: YearMonth, window: &GridWindow) -> Result<f64> {
    let time_index = grid
        .time_index(month)
        .ok_or_else(|| IndicatorError::DataQuality {
            month,
            message: "month is not on the remote time axis".to_string(),
        })?;

    let field = grid.regional_field(time_index, window)?;
    let anomaly = mean_defined(&field).ok_or_else(|| IndicatorError::DataQuality {
        month,
        message: format!(
            "all {} cells in the region are undefined",
            field.len()
        ),
    })?;

    debug!(month = %month, anomaly = anomaly, cells = field.len(), "Computed regional anomaly");
    Ok(anomaly)
}

/// Mean of the last [`INDICATOR_WINDOW`] values, `None` for an empty history
pub fn compute_indicator(recent_anomalies: &[f64]) -> Option<f64> {
    if recent_anomalies.is_empty() {
        return None;
    }
    let start = recent_anomalies.len().saturating_sub(INDICATOR_WINDOW);
    let window = &recent_anomalies[start..];
    Some(window.iter().sum::<f64>() / window.len() as f64)
}

/// What happened to each month handed to [`append_observed_months`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Months appended as observed records
    pub appended: Vec<YearMonth>,
    /// Month that failed the data-quality check, with the reason
    pub skipped: Option<(YearMonth, String)>,
    /// Months left for a later run because an earlier month was skipped
    pub deferred: Vec<YearMonth>,
}

/// Append observed records for `missing` months, oldest first.
///
/// Each month's indicator sees the anomalies appended before it. A month
/// whose region is wholly undefined is skipped and the months after it are
/// deferred, so the series never acquires a gap. Any other error aborts.
pub fn append_observed_months(
    series: &mut IndicatorSeries,
    grid: &dyn MonthlyGrid,
    window: &GridWindow,
    missing: &[YearMonth],
) -> Result<UpdateOutcome> {
    let mut months = missing.to_vec();
    months.sort();
    months.dedup();

    let mut outcome = UpdateOutcome::default();

    for (i, &month) in months.iter().enumerate() {
        let anomaly = match compute_anomaly(grid, month, window) {
            Ok(a) => round2(a),
            Err(IndicatorError::DataQuality { message, .. }) => {
                warn!(month = %month, reason = %message, "Skipping month with unusable data");
                outcome.skipped = Some((month, message));
                outcome.deferred = months[i + 1..].to_vec();
                if !outcome.deferred.is_empty() {
                    warn!(
                        deferred = outcome.deferred.len(),
                        "Deferring later months to keep the series contiguous"
                    );
                }
                break;
            }
            Err(e) => return Err(e),
        };

        let mut history = series.anomalies_through(month);
        history.push(anomaly);
        let indicator = compute_indicator(&history).map(round2).unwrap_or(anomaly);

        series.insert_observed(MonthRecord::observed(month, anomaly, indicator))?;
        info!(month = %month, anomaly = anomaly, indicator = indicator, "Appended observed month");
        outcome.appended.push(month);
    }

    Ok(outcome)
}

/// Recompute every observed record's indicator from the stored anomalies
pub fn rebuild_indicators(series: &mut IndicatorSeries) -> usize {
    let updates: Vec<(YearMonth, f64)> = series
        .observed()
        .filter_map(|r| {
            compute_indicator(&series.anomalies_through(r.month))
                .map(round2)
                .filter(|&value| value != r.indicator)
                .map(|value| (r.month, value))
        })
        .collect();

    for &(month, value) in &updates {
        series.set_indicator(month, value);
    }
    info!(changed = updates.len(), "Rebuilt observed indicators");
    updates.len()
}
