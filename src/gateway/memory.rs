//! In-memory monthly grid.
//!
//! Holds the whole `[time, lat, lon]` cube in an ndarray. Used for fixtures
//! and for small datasets that were fetched up front.

use ndarray::{s, Array2, Array3};

use super::MonthlyGrid;
use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::region::GridWindow;

/// A monthly grid backed by an owned `[time, lat, lon]` array
#[derive(Debug, Clone)]
pub struct InMemoryGrid {
    months: Vec<YearMonth>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    data: Array3<f32>,
}

impl InMemoryGrid {
    /// Build a grid, checking that the cube matches the axes
    pub fn new(
        months: Vec<YearMonth>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        data: Array3<f32>,
    ) -> Result<Self> {
        let expected = (months.len(), latitudes.len(), longitudes.len());
        if data.dim() != expected {
            return Err(IndicatorError::RemoteData {
                message: format!(
                    "Grid shape {:?} does not match axes (time, lat, lon) = {:?}",
                    data.dim(),
                    expected
                ),
            });
        }

        Ok(Self {
            months,
            latitudes,
            longitudes,
            data,
        })
    }

    /// A grid where every cell of month `i` holds `values[i]`
    pub fn uniform(
        months: Vec<YearMonth>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        values: &[f32],
    ) -> Result<Self> {
        let shape = (months.len(), latitudes.len(), longitudes.len());
        if values.len() != months.len() {
            return Err(IndicatorError::RemoteData {
                message: format!(
                    "{} values supplied for {} months",
                    values.len(),
                    months.len()
                ),
            });
        }
        let data = Array3::from_shape_fn(shape, |(t, _, _)| values[t]);
        Self::new(months, latitudes, longitudes, data)
    }
}

impl MonthlyGrid for InMemoryGrid {
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
        let (nt, nlat, nlon) = self.data.dim();
        if time_index >= nt || window.lat.high >= nlat || window.lon.high >= nlon {
            return Err(IndicatorError::RemoteData {
                message: format!(
                    "Window {:?} at time index {} is outside grid of shape {:?}",
                    window,
                    time_index,
                    self.data.dim()
                ),
            });
        }

        Ok(self
            .data
            .slice(s![time_index, window.lat.as_range(), window.lon.as_range()])
            .to_owned())
    }
}
