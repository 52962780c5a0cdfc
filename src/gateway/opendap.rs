//! NetCDF / OPeNDAP access to the remote gridded dataset.
//!
//! The coordinate axes are read eagerly when the dataset is opened; the
//! anomaly variable is only read one regional window at a time, so opening
//! a multi-gigabyte remote dataset costs a handful of small requests.

use ndarray::Array2;
use netcdf::{AttributeValue as NcAttributeValue, Extent, Variable as NetCDFVariable};
use tracing::{debug, info};

use super::{GridOpener, MonthlyGrid, TimeUnits};
use crate::config::GridVariables;
use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::region::GridWindow;
use crate::retry::RetryPolicy;

/// An open NetCDF dataset, local file or OPeNDAP URL
pub struct NetcdfGrid {
    file: netcdf::File,
    anomaly_variable: String,
    months: Vec<YearMonth>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    packing: Packing,
    retry: RetryPolicy,
}

/// Fill values and CF packing attributes of the anomaly variable
#[derive(Debug, Clone, Default, PartialEq)]
struct Packing {
    fill_values: Vec<f64>,
    scale_factor: Option<f64>,
    add_offset: Option<f64>,
}

impl Packing {
    fn from_variable(var: &NetCDFVariable) -> Self {
        let fill_values = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| numeric_attribute(var, name))
            .collect();
        Self {
            fill_values,
            scale_factor: numeric_attribute(var, "scale_factor"),
            add_offset: numeric_attribute(var, "add_offset"),
        }
    }

    /// Raw stored value to physical value, NaN when undefined
    fn unpack(&self, raw: f64) -> f32 {
        if !raw.is_finite() || self.fill_values.iter().any(|&f| f == raw) {
            return f32::NAN;
        }
        let scaled = raw * self.scale_factor.unwrap_or(1.0) + self.add_offset.unwrap_or(0.0);
        scaled as f32
    }
}

impl NetcdfGrid {
    /// Open a dataset and read its axes
    pub fn open(location: &str, variables: &GridVariables) -> Result<Self> {
        let file = netcdf::open(location)?;
        info!("Opened NetCDF dataset: {}", location);

        let (months, latitudes, longitudes, packing) = {
            let time_var = require_variable(&file, &variables.time)?;
            let raw_time = read_axis(&time_var)?;
            let units = text_attribute(&time_var, "units");
            let months = TimeUnits::parse(units.as_deref())?.to_months(&raw_time)?;

            let latitudes = read_axis(&require_variable(&file, &variables.latitude)?)?;
            let longitudes = read_axis(&require_variable(&file, &variables.longitude)?)?;

            let anomaly = require_variable(&file, &variables.anomaly)?;
            let shape: Vec<usize> = anomaly.dimensions().iter().map(|d| d.len()).collect();
            if shape != [months.len(), latitudes.len(), longitudes.len()] {
                return Err(IndicatorError::RemoteData {
                    message: format!(
                        "Variable {} has shape {:?}, expected (time, lat, lon) = ({}, {}, {})",
                        variables.anomaly,
                        shape,
                        months.len(),
                        latitudes.len(),
                        longitudes.len()
                    ),
                });
            }
            let packing = Packing::from_variable(&anomaly);
            (months, latitudes, longitudes, packing)
        };

        debug!(
            months = months.len(),
            latitudes = latitudes.len(),
            longitudes = longitudes.len(),
            fill_values = ?packing.fill_values,
            "Read dataset axes"
        );

        Ok(Self {
            file,
            anomaly_variable: variables.anomaly.clone(),
            months,
            latitudes,
            longitudes,
            packing,
            retry: RetryPolicy::no_retry(),
        })
    }

    /// Retry policy applied to each regional read
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn read_window(&self, time_index: usize, window: &GridWindow) -> Result<Vec<f64>> {
        let var = require_variable(&self.file, &self.anomaly_variable)?;
        let extents = [
            Extent::from(time_index),
            Extent::from(window.lat.as_range()),
            Extent::from(window.lon.as_range()),
        ];
        Ok(var.get_values::<f64, _>(&extents[..])?)
    }
}

impl MonthlyGrid for NetcdfGrid {
    fn months(&self) -> &[YearMonth] {
        &self.months
    }

    fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    fn regional_field(&self, time_index: usize, window: &GridWindow) -> Result<Array2<f32>> {
        if time_index >= self.months.len()
            || window.lat.high >= self.latitudes.len()
            || window.lon.high >= self.longitudes.len()
        {
            return Err(IndicatorError::RemoteData {
                message: format!(
                    "Window {:?} at time index {} is outside the dataset",
                    window, time_index
                ),
            });
        }

        let raw = self
            .retry
            .run_transient("read_region", |_| self.read_window(time_index, window))?;
        let values: Vec<f32> = raw.into_iter().map(|v| self.packing.unpack(v)).collect();

        let shape = (window.lat.as_range().len(), window.lon.as_range().len());
        Array2::from_shape_vec(shape, values).map_err(|e| {
            IndicatorError::RemoteData {
                message: format!("Unexpected slice size for {}: {}", self.anomaly_variable, e),
            }
        })
    }
}

/// Opens `{url_base}/{dataset_id}` with bounded retry
#[derive(Debug, Clone)]
pub struct NetcdfGateway {
    url_base: String,
    variables: GridVariables,
    retry: RetryPolicy,
}

impl NetcdfGateway {
    pub fn new(url_base: impl Into<String>, variables: GridVariables, retry: RetryPolicy) -> Self {
        Self {
            url_base: url_base.into(),
            variables,
            retry,
        }
    }

    /// Dataset location for an id; an empty base treats the id as a path
    pub fn location(&self, dataset_id: &str) -> String {
        if self.url_base.is_empty() {
            dataset_id.to_string()
        } else {
            format!("{}/{}", self.url_base.trim_end_matches('/'), dataset_id)
        }
    }
}

impl GridOpener for NetcdfGateway {
    fn open(&self, dataset_id: &str) -> Result<Box<dyn MonthlyGrid>> {
        let location = self.location(dataset_id);
        let grid = self.retry.run_transient("open_dataset", |_| {
            NetcdfGrid::open(&location, &self.variables)
        })?;
        let grid = grid.with_retry(self.retry);
        Ok(Box::new(grid))
    }
}

fn require_variable<'f>(file: &'f netcdf::File, name: &str) -> Result<NetCDFVariable<'f>> {
    file.variable(name).ok_or_else(|| IndicatorError::RemoteData {
        message: format!("Variable not found: {}", name),
    })
}

/// Read a whole 1-D coordinate variable as f64
fn read_axis(var: &NetCDFVariable) -> Result<Vec<f64>> {
    if var.dimensions().len() != 1 {
        return Err(IndicatorError::RemoteData {
            message: format!(
                "Coordinate variable {} has {} dimensions, expected 1",
                var.name(),
                var.dimensions().len()
            ),
        });
    }
    Ok(var.get_values::<f64, _>(&[] as &[Extent])?)
}

fn text_attribute(var: &NetCDFVariable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        NcAttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &NetCDFVariable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        NcAttributeValue::Uchar(v) => Some(v as f64),
        NcAttributeValue::Schar(v) => Some(v as f64),
        NcAttributeValue::Short(v) => Some(v as f64),
        NcAttributeValue::Ushort(v) => Some(v as f64),
        NcAttributeValue::Int(v) => Some(v as f64),
        NcAttributeValue::Uint(v) => Some(v as f64),
        NcAttributeValue::Float(v) => Some(v as f64),
        NcAttributeValue::Double(v) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::IndexRange;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Two months on a 3x4 grid; one cell of the second month is filled
    fn create_test_anomaly_file(path: &Path) -> std::result::Result<(), netcdf::Error> {
        let mut file = netcdf::create(path)?;

        file.add_dimension("time", 2)?;
        file.add_dimension("latitude", 3)?;
        file.add_dimension("longitude", 4)?;
        file.add_attribute("title", "Anomaly Test File")?;

        {
            let mut time_var = file.add_variable::<f64>("time", &["time"])?;
            time_var.put_attribute("units", "seconds since 1970-01-01T00:00:00Z")?;
            // 2025-08-16 and 2025-09-16
            time_var.put_values(&[1_755_302_400.0, 1_757_980_800.0], &[..])?;
        }
        {
            let mut lat_var = file.add_variable::<f64>("latitude", &["latitude"])?;
            lat_var.put_values(&[30.0, 31.0, 32.0], &[..])?;
        }
        {
            let mut lon_var = file.add_variable::<f64>("longitude", &["longitude"])?;
            lon_var.put_values(&[-121.0, -120.0, -119.0, -118.0], &[..])?;
        }
        {
            let mut anom_var =
                file.add_variable::<f32>("sstAnom", &["time", "latitude", "longitude"])?;
            anom_var.put_attribute("_FillValue", -999.0f32)?;
            let mut values: Vec<f32> = (0..24).map(|i| i as f32 / 10.0).collect();
            values[12] = -999.0;
            anom_var.put_values(&values, &[.., .., ..])?;
        }

        Ok(())
    }

    #[test]
    fn test_open_reads_axes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anom.nc");
        create_test_anomaly_file(&path).unwrap();

        let grid = NetcdfGrid::open(path.to_str().unwrap(), &GridVariables::default()).unwrap();
        let months: Vec<String> = grid.months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2025-08", "2025-09"]);
        assert_eq!(grid.latitudes(), &[30.0, 31.0, 32.0]);
        assert_eq!(grid.longitudes().len(), 4);
    }

    #[test]
    fn test_regional_field_masks_fill_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anom.nc");
        create_test_anomaly_file(&path).unwrap();

        let grid = NetcdfGrid::open(path.to_str().unwrap(), &GridVariables::default()).unwrap();
        let window = GridWindow {
            lat: IndexRange { low: 0, high: 1 },
            lon: IndexRange { low: 0, high: 1 },
        };
        let field = grid.regional_field(1, &window).unwrap();
        assert_eq!(field.dim(), (2, 2));
        assert!(field[[0, 0]].is_nan());
        assert!((field[[0, 1]] - 1.3).abs() < 1e-6);
        assert!((field[[1, 1]] - 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_missing_variable_is_not_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anom.nc");
        create_test_anomaly_file(&path).unwrap();

        let variables = GridVariables {
            anomaly: "analysed_sst".to_string(),
            ..GridVariables::default()
        };
        let result = NetcdfGrid::open(path.to_str().unwrap(), &variables);
        assert!(matches!(result, Err(IndicatorError::RemoteData { .. })));
    }

    #[test]
    fn test_gateway_gives_up_on_unreachable_dataset() {
        let dir = tempdir().unwrap();
        let gateway = NetcdfGateway::new(
            dir.path().to_string_lossy(),
            GridVariables::default(),
            RetryPolicy::new(2, Duration::ZERO),
        );
        assert!(gateway.open("does_not_exist.nc").is_err());
    }

    #[test]
    fn test_local_open_failures_are_not_retried() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("not_netcdf.nc"), b"<html>503</html>").unwrap();
        let gateway = NetcdfGateway::new(
            dir.path().to_string_lossy(),
            GridVariables::default(),
            RetryPolicy::new(3, Duration::from_secs(30)),
        );

        let start = std::time::Instant::now();
        for dataset in ["does_not_exist.nc", "not_netcdf.nc"] {
            let err = gateway.open(dataset).err().unwrap();
            assert!(!err.is_transient(), "{dataset}: {err}");
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_gateway_location() {
        let gateway = NetcdfGateway::new(
            "https://coastwatch.pfeg.noaa.gov/erddap/griddap/",
            GridVariables::default(),
            RetryPolicy::no_retry(),
        );
        assert_eq!(
            gateway.location("jplMURSST41anommday"),
            "https://coastwatch.pfeg.noaa.gov/erddap/griddap/jplMURSST41anommday"
        );
    }
}
