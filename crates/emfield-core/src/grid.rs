//! Sample-grid construction: polygon bounds to a regular lat/lon mesh with
//! an inside-polygon mask.
//!
//! Rows run north to south, columns west to east; all per-cell layers across
//! the engine share this row-major (H, W) layout. Coordinate math uses f64.

use serde::{Deserialize, Serialize};

/// Tolerance absorbing floating-point drift when counting axis steps.
const STEP_TOLERANCE: f64 = 1e-9;

/// A regular lat/lon sample grid clipped to a polygon.
#[derive(Debug, Clone)]
pub struct FieldGrid {
    /// Row latitudes, north to south. Length H.
    pub lat_axis: Vec<f64>,
    /// Column longitudes, west to east. Length W.
    pub lon_axis: Vec<f64>,
    /// Inside-polygon mask, row-major H×W.
    pub mask: Vec<bool>,
    pub height: usize,
    pub width: usize,
    pub resolution_deg: f64,
    /// The single AMSL altitude slice this grid samples, metres.
    pub altitude_m: f64,
}

/// Immutable grid metadata carried on results; the full axes are
/// reconstructible from origin and step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    /// Latitude of row 0 (the northernmost sample).
    pub origin_lat: f64,
    /// Longitude of column 0 (the westernmost sample).
    pub origin_lon: f64,
    pub resolution_deg: f64,
    pub height: usize,
    pub width: usize,
    pub altitude_m: f64,
}

impl GridDescriptor {
    /// Nearest cell to (lat, lon) by absolute per-axis distance, clamped to
    /// the grid. Returns (i, j).
    pub fn nearest_cell(&self, lat: f64, lon: f64) -> (usize, usize) {
        let i = ((self.origin_lat - lat) / self.resolution_deg).round();
        let j = ((lon - self.origin_lon) / self.resolution_deg).round();
        let i = (i.max(0.0) as usize).min(self.height - 1);
        let j = (j.max(0.0) as usize).min(self.width - 1);
        (i, j)
    }

    /// Centre coordinates (lat, lon) of cell (i, j).
    pub fn cell_center(&self, i: usize, j: usize) -> (f64, f64) {
        (
            self.origin_lat - i as f64 * self.resolution_deg,
            self.origin_lon + j as f64 * self.resolution_deg,
        )
    }
}

impl FieldGrid {
    /// Build the grid for a polygon of (lat, lon) vertices at the given
    /// resolution. Latitudes descend from the polygon's northern bound,
    /// longitudes ascend from its western bound, both inclusive at the far
    /// bound within tolerance. Deterministic for identical inputs.
    pub fn build(polygon: &[(f64, f64)], resolution_deg: f64, altitude_m: f64) -> Self {
        let (lat_min, lat_max, lon_min, lon_max) = polygon_bounds(polygon);

        let height = axis_len(lat_max - lat_min, resolution_deg);
        let width = axis_len(lon_max - lon_min, resolution_deg);

        let lat_axis: Vec<f64> = (0..height)
            .map(|i| lat_max - i as f64 * resolution_deg)
            .collect();
        let lon_axis: Vec<f64> = (0..width)
            .map(|j| lon_min + j as f64 * resolution_deg)
            .collect();

        let mut mask = vec![false; height * width];
        for (i, &lat) in lat_axis.iter().enumerate() {
            for (j, &lon) in lon_axis.iter().enumerate() {
                mask[i * width + j] = point_in_polygon(lat, lon, polygon);
            }
        }

        Self {
            lat_axis,
            lon_axis,
            mask,
            height,
            width,
            resolution_deg,
            altitude_m,
        }
    }

    pub fn cells(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.width + j
    }

    /// Number of cells inside the polygon.
    pub fn inside_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn descriptor(&self) -> GridDescriptor {
        GridDescriptor {
            origin_lat: self.lat_axis[0],
            origin_lon: self.lon_axis[0],
            resolution_deg: self.resolution_deg,
            height: self.height,
            width: self.width,
            altitude_m: self.altitude_m,
        }
    }
}

/// Number of samples covering `span` degrees at `step` degrees per sample,
/// inclusive at both ends within tolerance. A degenerate span yields one
/// sample.
fn axis_len(span: f64, step: f64) -> usize {
    (span / step + STEP_TOLERANCE).floor() as usize + 1
}

/// Bounding box (lat_min, lat_max, lon_min, lon_max) of a vertex list.
pub fn polygon_bounds(polygon: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let mut lat_min = f64::INFINITY;
    let mut lat_max = f64::NEG_INFINITY;
    let mut lon_min = f64::INFINITY;
    let mut lon_max = f64::NEG_INFINITY;
    for &(lat, lon) in polygon {
        lat_min = lat_min.min(lat);
        lat_max = lat_max.max(lat);
        lon_min = lon_min.min(lon);
        lon_max = lon_max.max(lon);
    }
    (lat_min, lat_max, lon_min, lon_max)
}

/// Even-odd ray casting in the (lon, lat) plane. A closing vertex equal to
/// the first is tolerated.
pub fn point_in_polygon(lat: f64, lon: f64, polygon: &[(f64, f64)]) -> bool {
    let n = effective_len(polygon);
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut k = n - 1;
    for m in 0..n {
        let (lat_m, lon_m) = polygon[m];
        let (lat_k, lon_k) = polygon[k];
        if (lat_m > lat) != (lat_k > lat) {
            let lon_cross = (lon_k - lon_m) * (lat - lat_m) / (lat_k - lat_m) + lon_m;
            if lon < lon_cross {
                inside = !inside;
            }
        }
        k = m;
    }
    inside
}

/// Vertex count ignoring a duplicated closing vertex.
pub fn effective_len(polygon: &[(f64, f64)]) -> usize {
    let n = polygon.len();
    if n > 1 && polygon[0] == polygon[n - 1] {
        n - 1
    } else {
        n
    }
}
