//! Regional extraction: bounding box to grid index ranges.
//!
//! Each bound is snapped to the nearest coordinate value. When two coordinates
//! are equally close the one with the lower index wins, which on an ascending
//! axis is the smaller value. Bounds outside the axis clamp to its endpoints.

use serde::{Deserialize, Serialize};

use crate::error::{IndicatorError, Result};

/// Inclusive range of grid indices along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub low: usize,
    pub high: usize,
}

impl IndexRange {
    /// Half-open form for slicing
    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.low..self.high + 1
    }
}

/// Geographic bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    /// `[min, max]` latitude
    pub lat_range: [f64; 2],
    /// `[min, max]` longitude
    pub lon_range: [f64; 2],
}

impl RegionBounds {
    /// Resolve the box against a grid's coordinate axes
    pub fn window(&self, latitudes: &[f64], longitudes: &[f64]) -> Result<GridWindow> {
        Ok(GridWindow {
            lat: index_range(latitudes, self.lat_range)?,
            lon: index_range(longitudes, self.lon_range)?,
        })
    }
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self {
            lat_range: [30.8, 34.5],
            lon_range: [-120.3, -116.0],
        }
    }
}

/// Index ranges selecting a region on a latitude/longitude grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    pub lat: IndexRange,
    pub lon: IndexRange,
}

/// Index of the coordinate closest to `value`
pub fn nearest_index(coords: &[f64], value: f64) -> Result<usize> {
    if coords.is_empty() {
        return Err(IndicatorError::RemoteData {
            message: "Coordinate axis is empty".to_string(),
        });
    }
    if !value.is_finite() {
        return Err(IndicatorError::Config {
            message: format!("Region bound {} is not a finite number", value),
        });
    }

    let mut closest_idx = 0;
    let mut min_diff = f64::MAX;

    for (i, &coord) in coords.iter().enumerate() {
        let diff = (coord - value).abs();
        // Strict comparison keeps the lower index on ties.
        if diff < min_diff {
            min_diff = diff;
            closest_idx = i;
        }
    }

    Ok(closest_idx)
}

/// Map a `[min, max]` interval onto an inclusive index range
pub fn index_range(coords: &[f64], bounds: [f64; 2]) -> Result<IndexRange> {
    let a = nearest_index(coords, bounds[0])?;
    let b = nearest_index(coords, bounds[1])?;
    Ok(IndexRange {
        low: a.min(b),
        high: a.max(b),
    })
}
