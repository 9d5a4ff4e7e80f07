//! Typed result container: per-band rasters, Top-K diagnostics, source
//! ordering, point queries and the external-writer handoff.
//!
//! Results are immutable once packaged. Raster storage is f32 with quiet
//! NaN as the no-data sentinel; everything that produced those values was
//! computed in f64.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::grid::GridDescriptor;

/// Altitude tolerance for point queries, metres. The computed slice is
/// exact; anything beyond float noise is a different slice.
const QUERY_ALT_TOLERANCE_M: f64 = 1e-6;

/// A row-major field-strength raster in dBμV/m, NaN where masked or below
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRaster {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl FieldRaster {
    pub fn filled(width: usize, height: usize, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.width + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        self.data[i * self.width + j] = value;
    }

    /// Number of finite (above-threshold, inside-mask) cells.
    pub fn finite_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Largest finite value, if any cell survived masking.
    pub fn max_value(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.max(v))))
    }
}

/// One retained contributor of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopContribution {
    pub i: usize,
    pub j: usize,
    /// Cell-centre coordinates, duplicated for columnar consumers.
    pub lat: f64,
    pub lon: f64,
    /// 0 is the strongest contributor; ranks form a prefix of {0, 1, 2}.
    pub rank: u8,
    pub source_id: String,
    /// Share of the cell's total power density, in (0, 1].
    pub fraction: f64,
}

/// Everything computed for one band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandField {
    pub name: String,
    /// Band center frequency the band was evaluated at, MHz.
    pub center_mhz: f64,
    pub raster: FieldRaster,
    /// Sparse Top-K table: above-threshold cells only, grouped per cell in
    /// rank order.
    pub top_contributions: Vec<TopContribution>,
}

/// A point-query answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSample {
    pub band: String,
    pub i: usize,
    pub j: usize,
    pub lat: f64,
    pub lon: f64,
    pub field_dbuv_per_m: f64,
    /// The cell's contributors in descending fraction order.
    pub top_contributions: Vec<TopContribution>,
}

/// The immutable result of one engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResult {
    /// Per-band fields, in request band order.
    pub bands: Vec<BandField>,
    /// Source ids in the order they were consumed (post-filter). Top-K
    /// source indices refer to this ordering.
    pub source_ids: Vec<String>,
    /// Sources dropped by the influence buffer.
    pub sources_filtered: usize,
    pub grid: GridDescriptor,
    pub elapsed_ms: u64,
}

impl FieldResult {
    /// Look up a band by name.
    pub fn band(&self, name: &str) -> Option<&BandField> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// Answer a point query against one band's raster.
    ///
    /// The nearest cell is chosen by absolute lat/lon distance. The queried
    /// altitude must match the computed slice; masked or sub-threshold
    /// cells answer `NoData`.
    pub fn point_query(
        &self,
        lat: f64,
        lon: f64,
        alt_m: f64,
        band_name: &str,
    ) -> Result<PointSample, EngineError> {
        if (alt_m - self.grid.altitude_m).abs() > QUERY_ALT_TOLERANCE_M {
            return Err(EngineError::QueryMismatch {
                requested_m: alt_m,
                grid_m: self.grid.altitude_m,
            });
        }
        let band = self
            .band(band_name)
            .ok_or_else(|| EngineError::UnknownBand(band_name.to_owned()))?;

        let (i, j) = self.grid.nearest_cell(lat, lon);
        let value = band.raster.get(i, j);
        if !value.is_finite() {
            return Err(EngineError::NoData);
        }

        let mut top: Vec<TopContribution> = band
            .top_contributions
            .iter()
            .filter(|c| c.i == i && c.j == j)
            .cloned()
            .collect();
        top.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));

        let (cell_lat, cell_lon) = self.grid.cell_center(i, j);
        Ok(PointSample {
            band: band.name.clone(),
            i,
            j,
            lat: cell_lat,
            lon: cell_lon,
            field_dbuv_per_m: f64::from(value),
            top_contributions: top,
        })
    }

    /// Hand the result to an external writer, one call per band plus the
    /// final metadata. Format-specific serialisation (GeoTIFF, Parquet,
    /// quicklook images) lives entirely in the collaborator.
    pub fn write_to(&self, dir: &Path, writer: &mut dyn ResultWriter) -> io::Result<()> {
        for band in &self.bands {
            writer.write_band(dir, band, &self.grid)?;
        }
        writer.finish(dir, self)
    }
}

/// External serialisation seam. Implementations receive every band in
/// request order, then one `finish` call with the whole result.
pub trait ResultWriter {
    fn write_band(&mut self, dir: &Path, band: &BandField, grid: &GridDescriptor) -> io::Result<()>;

    fn finish(&mut self, _dir: &Path, _result: &FieldResult) -> io::Result<()> {
        Ok(())
    }
}
