//! Quicklook collaborator: runs the engine on a request JSON and writes one
//! colour-mapped PNG plus a Top-K CSV per band through the `ResultWriter`
//! seam. The production GeoTIFF/Parquet writers implement the same trait
//! elsewhere; this tool exists for eyeballing results.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use emfield_core::grid::GridDescriptor;
use emfield_core::result::{BandField, FieldResult};
use emfield_core::{compute_field, FieldRequest, ResultWriter};

#[derive(Parser, Debug)]
#[command(
    name = "fieldmap",
    about = "Run the EM field engine on a request JSON and write quicklook PNG/CSV outputs"
)]
struct Args {
    /// Request JSON file.
    #[arg(short, long)]
    request: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = "data/quicklook")]
    out: PathBuf,

    /// Only write this band.
    #[arg(long)]
    band: Option<String>,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Normalised field strength → heat ramp: deep blue (quiet) through green to
/// yellow-white (hot). NaN cells are handled by the caller.
fn field_to_rgba(t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    let r = (255.0 * t.powf(1.5)) as u8;
    let g = (255.0 * t) as u8;
    let b = (180.0 * (1.0 - t) + 40.0) as u8;
    [r, g, b, 255]
}

/// No-data cells render as transparent dark grey.
const NODATA_RGBA: [u8; 4] = [30, 30, 30, 64];

// ── Writer ────────────────────────────────────────────────────────────────────

struct QuicklookWriter {
    band_filter: Option<String>,
    bands_written: usize,
}

impl QuicklookWriter {
    fn new(band_filter: Option<String>) -> Self {
        Self {
            band_filter,
            bands_written: 0,
        }
    }

    fn wants(&self, band: &BandField) -> bool {
        self.band_filter
            .as_deref()
            .map_or(true, |name| name == band.name)
    }
}

impl ResultWriter for QuicklookWriter {
    fn write_band(&mut self, dir: &Path, band: &BandField, grid: &GridDescriptor) -> io::Result<()> {
        if !self.wants(band) {
            return Ok(());
        }

        // Normalise over the finite range; an all-NaN band renders as pure
        // no-data.
        let raster = &band.raster;
        let min = raster
            .data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f32::INFINITY, f32::min);
        let max = raster.max_value().unwrap_or(f32::INFINITY);
        let span = (max - min).max(1e-6);

        let mut img = image::RgbaImage::new(grid.width as u32, grid.height as u32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let value = raster.get(y as usize, x as usize);
            *pixel = if value.is_finite() {
                image::Rgba(field_to_rgba((value - min) / span))
            } else {
                image::Rgba(NODATA_RGBA)
            };
        }
        let png_path = dir.join(format!("{}.png", band.name));
        img.save(&png_path).map_err(io::Error::other)?;

        let mut csv = String::from("lat,lon,rank,source_id,fraction\n");
        for row in &band.top_contributions {
            csv.push_str(&format!(
                "{:.6},{:.6},{},{},{:.6}\n",
                row.lat, row.lon, row.rank, row.source_id, row.fraction
            ));
        }
        fs::write(dir.join(format!("{}_top_contributions.csv", band.name)), csv)?;

        log::info!(
            "band {:?}: {} finite cells, {} Top-K rows -> {}",
            band.name,
            raster.finite_count(),
            band.top_contributions.len(),
            png_path.display()
        );
        self.bands_written += 1;
        Ok(())
    }

    fn finish(&mut self, dir: &Path, result: &FieldResult) -> io::Result<()> {
        let summary = serde_json::json!({
            "grid": result.grid,
            "source_ids": result.source_ids,
            "sources_filtered": result.sources_filtered,
            "elapsed_ms": result.elapsed_ms,
            "bands": result.bands.iter().map(|b| serde_json::json!({
                "name": b.name,
                "center_mhz": b.center_mhz,
                "finite_cells": b.raster.finite_count(),
                "max_dbuv_per_m": b.raster.max_value(),
            })).collect::<Vec<_>>(),
        });
        fs::write(
            dir.join("summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let json = fs::read_to_string(&args.request)
        .with_context(|| format!("cannot read {}", args.request.display()))?;
    let request = FieldRequest::from_json(&json)?;
    let result = compute_field(&request)?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("cannot create {}", args.out.display()))?;
    let mut writer = QuicklookWriter::new(args.band.clone());
    result.write_to(&args.out, &mut writer)?;

    if writer.bands_written == 0 {
        anyhow::bail!(
            "no band matched {:?}; request has {:?}",
            args.band,
            result.bands.iter().map(|b| &b.name).collect::<Vec<_>>()
        );
    }
    println!(
        "{} band(s), {} sources, grid {}×{} -> {}",
        writer.bands_written,
        result.source_ids.len(),
        result.grid.height,
        result.grid.width,
        args.out.display()
    );
    Ok(())
}
