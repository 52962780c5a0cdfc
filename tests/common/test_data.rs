//! Test data generation utilities.
//!
//! This module writes small NetCDF anomaly datasets shaped like the monthly
//! ERDDAP product, and seed series files, for the pipeline tests.

use chrono::NaiveDate;
use std::path::Path;
use total_indicator::YearMonth;

use netcdf::Error;
type Result<T> = std::result::Result<T, Error>;

/// Fill value used for undefined cells
pub const FILL_VALUE: f32 = -999.0;

/// Latitudes of the fixture grid; the default region snaps to indices 1..=4
pub const LATITUDES: [f64; 6] = [30.0, 31.0, 32.0, 33.0, 34.0, 35.0];

/// Longitudes of the fixture grid; the default region snaps to indices 1..=5
pub const LONGITUDES: [f64; 6] = [-121.0, -120.0, -119.0, -118.0, -117.0, -116.0];

/// Consecutive months starting at `first`
pub fn month_range(first: &str, count: usize) -> Vec<YearMonth> {
    let mut month: YearMonth = first.parse().unwrap();
    let mut months = Vec::with_capacity(count);
    for _ in 0..count {
        months.push(month);
        month = month.succ();
    }
    months
}

/// Mid-month instant in seconds since 1970-01-01, as ERDDAP stamps monthly composites
fn mid_month_seconds(month: YearMonth) -> f64 {
    NaiveDate::from_ymd_opt(month.year(), month.month(), 16)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp() as f64
}

/// Creates a monthly anomaly dataset.
///
/// Month `i` holds `values[i]` in every cell, except one cell inside the
/// default region which is always the fill value. `None` fills the whole
/// month.
///
/// # Arguments
///
/// * `path` - The path where the NetCDF file will be saved
/// * `months` - The time axis
/// * `values` - One entry per month
pub fn create_anomaly_nc(path: &Path, months: &[YearMonth], values: &[Option<f32>]) -> Result<()> {
    assert_eq!(months.len(), values.len());

    let mut file = netcdf::create(path)?;

    file.add_dimension("time", months.len())?;
    file.add_dimension("latitude", LATITUDES.len())?;
    file.add_dimension("longitude", LONGITUDES.len())?;

    file.add_attribute("title", "Monthly SST Anomaly Test Data")?;
    file.add_attribute("institution", "total-indicator test suite")?;

    let time_values: Vec<f64> = months.iter().map(|&m| mid_month_seconds(m)).collect();

    let cells = LATITUDES.len() * LONGITUDES.len();
    let mut data = Vec::with_capacity(months.len() * cells);
    for value in values {
        for lat in 0..LATITUDES.len() {
            for lon in 0..LONGITUDES.len() {
                let cell = match value {
                    Some(_) if lat == 2 && lon == 2 => FILL_VALUE,
                    Some(v) => *v,
                    None => FILL_VALUE,
                };
                data.push(cell);
            }
        }
    }

    {
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", "seconds since 1970-01-01T00:00:00Z")?;
        time_var.put_attribute("standard_name", "time")?;
        time_var.put_values(&time_values, &[..])?;
    }

    {
        let mut lat_var = file.add_variable::<f64>("latitude", &["latitude"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_values(&LATITUDES, &[..])?;
    }

    {
        let mut lon_var = file.add_variable::<f64>("longitude", &["longitude"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_values(&LONGITUDES, &[..])?;
    }

    {
        let mut anom_var =
            file.add_variable::<f32>("sstAnom", &["time", "latitude", "longitude"])?;
        anom_var.put_attribute("_FillValue", FILL_VALUE)?;
        anom_var.put_attribute("units", "degree_C")?;
        anom_var.put_attribute("long_name", "Sea Surface Temperature Anomaly")?;
        anom_var.put_values(&data, &[.., .., ..])?;
    }

    Ok(())
}

/// Write a seed series file
pub fn write_series_csv(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_anomaly_nc() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anom.nc");
        let months = month_range("2025-01", 2);

        create_anomaly_nc(&path, &months, &[Some(0.5), None]).unwrap();

        let file = netcdf::open(&path).unwrap();
        assert_eq!(file.dimension("time").unwrap().len(), 2);
        assert!(file.variable("sstAnom").is_some());
    }

    #[test]
    fn test_month_range() {
        let months = month_range("2024-11", 3);
        let labels: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(labels, vec!["2024-11", "2024-12", "2025-01"]);
    }
}
