//! The monthly indicator series and its invariants.
//!
//! Records are kept sorted by month. At most one record is a forecast and it
//! is always last; every other record carries a measured anomaly. Those
//! properties are only *checked* by [`IndicatorSeries::validate`], so a series
//! read from a damaged file can still be inspected and repaired in memory.

use std::collections::BTreeSet;

use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;

/// Number of trailing anomalies averaged into the indicator
pub const INDICATOR_WINDOW: usize = 6;

/// Round to the two decimals the series is stored with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One month of the indicator series
#[derive(Debug, Clone, PartialEq)]
pub struct MonthRecord {
    /// Natural key
    pub month: YearMonth,
    /// Regional mean anomaly; `None` only on the forecast row
    pub anomaly: Option<f64>,
    /// Trailing mean of anomalies ending at this month
    pub indicator: f64,
    /// Synthetic next-month row
    pub is_forecast: bool,
}

impl MonthRecord {
    pub fn observed(month: YearMonth, anomaly: f64, indicator: f64) -> Self {
        Self {
            month,
            anomaly: Some(anomaly),
            indicator,
            is_forecast: false,
        }
    }

    pub fn forecast(month: YearMonth, indicator: f64) -> Self {
        Self {
            month,
            anomaly: None,
            indicator,
            is_forecast: true,
        }
    }
}

/// Ordered collection of month records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSeries {
    records: Vec<MonthRecord>,
}

impl IndicatorSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records in any order; sorting is stable so duplicates stay visible
    pub fn from_records(mut records: Vec<MonthRecord>) -> Self {
        records.sort_by_key(|r| r.month);
        Self { records }
    }

    pub fn records(&self) -> &[MonthRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Non-forecast records in month order
    pub fn observed(&self) -> impl Iterator<Item = &MonthRecord> {
        self.records.iter().filter(|r| !r.is_forecast)
    }

    pub fn observed_months(&self) -> BTreeSet<YearMonth> {
        self.observed().map(|r| r.month).collect()
    }

    pub fn last_observed(&self) -> Option<&MonthRecord> {
        self.observed().last()
    }

    pub fn first_month(&self) -> Option<YearMonth> {
        self.records.first().map(|r| r.month)
    }

    /// The trailing forecast record, if the last record is one
    pub fn forecast(&self) -> Option<&MonthRecord> {
        self.records.last().filter(|r| r.is_forecast)
    }

    /// Observed anomalies for months up to and including `month`, oldest first
    pub fn anomalies_through(&self, month: YearMonth) -> Vec<f64> {
        self.observed()
            .filter(|r| r.month <= month)
            .filter_map(|r| r.anomaly)
            .collect()
    }

    /// Insert an observed record at its sorted position
    pub fn insert_observed(&mut self, record: MonthRecord) -> Result<()> {
        if record.is_forecast || record.anomaly.is_none() {
            return Err(IndicatorError::InvariantViolation {
                message: format!("Observed record for {} has no anomaly", record.month),
            });
        }
        match self.records.binary_search_by_key(&record.month, |r| r.month) {
            Ok(_) => Err(IndicatorError::InvariantViolation {
                message: format!("Duplicate month {}", record.month),
            }),
            Err(pos) => {
                self.records.insert(pos, record);
                Ok(())
            }
        }
    }

    /// Drop every forecast record, wherever it sits; returns how many were removed
    pub fn remove_forecasts(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.is_forecast);
        before - self.records.len()
    }

    /// Replace any existing forecast with `record`, appended last
    pub fn set_forecast(&mut self, record: MonthRecord) -> Result<()> {
        self.remove_forecasts();
        if let Some(last) = self.records.last() {
            if record.month <= last.month {
                return Err(IndicatorError::InvariantViolation {
                    message: format!(
                        "Forecast month {} does not follow last month {}",
                        record.month, last.month
                    ),
                });
            }
        }
        self.records.push(MonthRecord {
            anomaly: None,
            is_forecast: true,
            ..record
        });
        Ok(())
    }

    /// Replace the indicator of an existing record
    pub(crate) fn set_indicator(&mut self, month: YearMonth, indicator: f64) {
        if let Some(record) = self.records.iter_mut().find(|r| r.month == month) {
            record.indicator = indicator;
        }
    }

    /// Check every invariant a persisted series must satisfy
    pub fn validate(&self) -> Result<()> {
        let violation = |message: String| Err(IndicatorError::InvariantViolation { message });

        for pair in self.records.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.month >= next.month {
                return violation(format!(
                    "Months not strictly ascending: {} then {}",
                    prev.month, next.month
                ));
            }
            if prev.month.succ() != next.month {
                return violation(format!("Gap between {} and {}", prev.month, next.month));
            }
        }

        let last_index = self.records.len().saturating_sub(1);
        for (i, record) in self.records.iter().enumerate() {
            if !record.indicator.is_finite() {
                return violation(format!("Indicator for {} is not a number", record.month));
            }
            if record.is_forecast {
                if i != last_index {
                    return violation(format!(
                        "Forecast row {} is not the last record",
                        record.month
                    ));
                }
                if record.anomaly.is_some() {
                    return violation(format!(
                        "Forecast row {} carries a measured anomaly",
                        record.month
                    ));
                }
            } else {
                match record.anomaly {
                    Some(a) if a.is_finite() => {}
                    _ => {
                        return violation(format!(
                            "Observed row {} has no valid anomaly",
                            record.month
                        ))
                    }
                }
            }
        }

        Ok(())
    }
}
