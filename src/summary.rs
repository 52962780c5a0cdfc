//! Dashboard summary derived from the final series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{IndicatorError, Result};
use crate::series::{IndicatorSeries, MonthRecord};
use crate::store::{format_value, write_atomically};

/// Indicator value at or above which the dashboard shows an alert
pub const ALERT_THRESHOLD: f64 = 0.77;

/// Dashboard alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    #[serde(rename = "Alert")]
    Alert,
    #[serde(rename = "No Alert")]
    NoAlert,
}

impl AlertStatus {
    pub fn for_indicator(indicator: f64) -> Self {
        if indicator >= ALERT_THRESHOLD {
            AlertStatus::Alert
        } else {
            AlertStatus::NoAlert
        }
    }
}

/// The `web_data.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub alert: AlertStatus,
    #[serde(rename = "fc_date")]
    pub forecast_month_label: String,
    #[serde(rename = "update_date")]
    pub updated_at: String,
    #[serde(rename = "new_index")]
    pub latest_indicator: String,
}

/// Record the dashboard reports: the forecast if present, else the latest observation
pub fn select_record(series: &IndicatorSeries) -> Option<&MonthRecord> {
    series.forecast().or_else(|| series.last_observed())
}

/// Build the summary as of `today`
pub fn build(series: &IndicatorSeries, today: NaiveDate) -> Result<DashboardSummary> {
    let record = select_record(series).ok_or_else(|| IndicatorError::InvariantViolation {
        message: "Cannot summarise an empty series".to_string(),
    })?;

    Ok(DashboardSummary {
        alert: AlertStatus::for_indicator(record.indicator),
        forecast_month_label: record.month.label(),
        updated_at: today.format("%d %b, %Y").to_string(),
        latest_indicator: format_value(record.indicator),
    })
}

/// Write the summary as 4-space indented JSON, atomically
pub fn write_summary(path: &Path, summary: &DashboardSummary) -> Result<()> {
    write_atomically(path, |writer| {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        summary.serialize(&mut serializer)?;
        Ok(())
    })?;
    info!(
        path = %path.display(),
        alert = ?summary.alert,
        fc_date = %summary.forecast_month_label,
        new_index = %summary.latest_indicator,
        "Dashboard summary written"
    );
    Ok(())
}
