//! Remote data gateway.
//!
//! The pipeline only ever needs three things from the remote gridded dataset:
//! its time axis as calendar months, its two coordinate axes, and the anomaly
//! field for one month inside a regional window. [`MonthlyGrid`] captures that
//! view; implementations live in the submodules.

pub mod erddap;
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod opendap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ndarray::Array2;

use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::region::GridWindow;

pub use erddap::ErddapClient;
pub use memory::InMemoryGrid;
#[cfg(feature = "netcdf")]
pub use opendap::{NetcdfGateway, NetcdfGrid};

/// Read-only view of a monthly time/latitude/longitude dataset
pub trait MonthlyGrid {
    /// Available months, in time-axis order
    fn months(&self) -> &[YearMonth];

    /// Latitude coordinate values
    fn latitudes(&self) -> &[f64];

    /// Longitude coordinate values
    fn longitudes(&self) -> &[f64];

    /// Anomaly values for one time step inside `window`, shaped `[lat, lon]`.
    /// Undefined cells are NaN.
    fn regional_field(&self, time_index: usize, window: &GridWindow) -> Result<Array2<f32>>;

    /// Newest month on the time axis
    fn latest_month(&self) -> Option<YearMonth> {
        self.months().iter().max().copied()
    }

    /// Position of `month` on the time axis
    fn time_index(&self, month: YearMonth) -> Option<usize> {
        self.months().iter().position(|m| *m == month)
    }
}

/// Opens a dataset by id, owning whatever retry policy applies
pub trait GridOpener {
    fn open(&self, dataset_id: &str) -> Result<Box<dyn MonthlyGrid>>;
}

/// Cheap lookup of the newest month a remote dataset offers
pub trait LatestMonthSource {
    fn latest_month(&self) -> Result<YearMonth>;
}

/// Conversion from raw time coordinate values to UTC instants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    seconds_per_unit: f64,
    epoch_offset_seconds: f64,
}

impl TimeUnits {
    /// Seconds since 1970-01-01, what ERDDAP serves
    pub fn epoch_seconds() -> Self {
        Self {
            seconds_per_unit: 1.0,
            epoch_offset_seconds: 0.0,
        }
    }

    /// Parse a CF-style `units` attribute such as `days since 2000-01-01`.
    /// `None` means epoch seconds.
    pub fn parse(units: Option<&str>) -> Result<Self> {
        let Some(units) = units else {
            return Ok(Self::epoch_seconds());
        };

        let invalid = || IndicatorError::RemoteData {
            message: format!("Unsupported time units: {:?}", units),
        };

        let (unit, origin) = units.trim().split_once(" since ").ok_or_else(invalid)?;
        let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return Err(invalid()),
        };
        let origin = parse_origin(origin.trim()).ok_or_else(invalid)?;

        Ok(Self {
            seconds_per_unit,
            epoch_offset_seconds: origin.and_utc().timestamp() as f64,
        })
    }

    /// Month containing the instant `value` units after the origin
    pub fn to_month(&self, value: f64) -> Option<YearMonth> {
        YearMonth::from_epoch_seconds(self.epoch_offset_seconds + value * self.seconds_per_unit)
    }

    /// Convert a whole time axis, failing on any value that is not a valid instant
    pub fn to_months(&self, values: &[f64]) -> Result<Vec<YearMonth>> {
        values
            .iter()
            .map(|&v| {
                self.to_month(v).ok_or_else(|| IndicatorError::RemoteData {
                    message: format!("Time coordinate {} is not a valid instant", v),
                })
            })
            .collect()
    }
}

fn parse_origin(origin: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(origin) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    let origin = origin
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(origin, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(origin, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
