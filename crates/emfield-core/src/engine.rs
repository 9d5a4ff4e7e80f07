//! Engine orchestrator: drives geometry, gain, loss and power conversion
//! over the grid for every band, folds sources into the per-cell
//! accumulator, and applies the no-data threshold with Top-K consistency.
//!
//! The computation is pure: identical requests produce identical rasters.
//! Sources fold in post-filter request order; with the `threading` feature
//! only the rows of a single source layer run in parallel, so the fold
//! order (and therefore every bit of the output) is unchanged.

use std::time::Instant;

use log::{debug, info};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::accumulator::BandAccumulator;
use crate::antenna;
use crate::error::EngineError;
use crate::geodesy;
use crate::grid::FieldGrid;
use crate::power;
use crate::propagation;
use crate::request::{Band, Environment, FieldRequest, Source};
use crate::result::{BandField, FieldRaster, FieldResult, TopContribution};

/// Run the full estimation for one request.
pub fn compute_field(request: &FieldRequest) -> Result<FieldResult, EngineError> {
    let started = Instant::now();
    request.validate()?;

    let vertices = request.region.vertices();
    let grid = FieldGrid::build(&vertices, request.grid.resolution_deg, request.grid.altitude_m);
    info!(
        "grid {}×{} at {}° ({} cells inside the polygon)",
        grid.height,
        grid.width,
        grid.resolution_deg,
        grid.inside_count()
    );

    let (sources, sources_filtered) =
        filter_sources(&request.sources, &vertices, request.influence_buffer_km);
    info!(
        "{} of {} sources within the {} km influence buffer",
        sources.len(),
        request.sources.len(),
        request.influence_buffer_km
    );

    let bands = request
        .bands
        .iter()
        .map(|band| {
            compute_band(
                band,
                &sources,
                &grid,
                &request.environment,
                request.threshold_dbuv_per_m,
            )
        })
        .collect();

    Ok(FieldResult {
        bands,
        source_ids: sources.iter().map(|s| s.id.clone()).collect(),
        sources_filtered,
        grid: grid.descriptor(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Cull sources farther than the influence buffer from every polygon
/// vertex. Vertex-only distance is conservative at this system's scale.
/// Preserves input order.
fn filter_sources<'a>(
    sources: &'a [Source],
    polygon: &[(f64, f64)],
    buffer_km: f64,
) -> (Vec<&'a Source>, usize) {
    let kept: Vec<&Source> = sources
        .iter()
        .filter(|source| {
            let min_km = polygon
                .iter()
                .map(|&(lat, lon)| {
                    geodesy::haversine_km(source.position.lat, source.position.lon, lat, lon)
                })
                .fold(f64::INFINITY, f64::min);
            min_km <= buffer_km
        })
        .collect();
    let filtered = sources.len() - kept.len();
    (kept, filtered)
}

/// Compute one band: fold every spectrally-overlapping source into the
/// accumulator, convert to field strength, then mask and threshold.
fn compute_band(
    band: &Band,
    sources: &[&Source],
    grid: &FieldGrid,
    environment: &Environment,
    threshold_dbuv_per_m: f64,
) -> BandField {
    let band_started = Instant::now();
    let f_mhz = band.center_mhz();

    let mut accumulator = BandAccumulator::new(grid.cells());
    for (index, source) in sources.iter().enumerate() {
        if !band.overlaps(source.emission.freq_mhz, source.emission.bandwidth_mhz) {
            continue;
        }
        let layer = source_power_layer(source, f_mhz, grid, environment);
        accumulator.fold_source(index, &layer);
    }

    // Mask and threshold in one pass: a cell below threshold keeps its NaN
    // and never emits Top-K rows, so the raster and the table stay
    // consistent by construction.
    let mut raster = FieldRaster::filled(grid.width, grid.height, f32::NAN);
    let mut top_contributions = Vec::new();
    for i in 0..grid.height {
        for j in 0..grid.width {
            let cell = grid.index(i, j);
            if !grid.mask[cell] {
                continue;
            }
            let field = power::field_strength_dbuv_per_m(accumulator.total()[cell]);
            if field < threshold_dbuv_per_m {
                continue;
            }
            raster.set(i, j, field as f32);
            for (rank, (source_index, fraction)) in accumulator.fractions(cell).enumerate() {
                top_contributions.push(TopContribution {
                    i,
                    j,
                    lat: grid.lat_axis[i],
                    lon: grid.lon_axis[j],
                    rank: rank as u8,
                    source_id: sources[source_index].id.clone(),
                    fraction,
                });
            }
        }
    }

    debug!(
        "band {:?} at {:.1} MHz: {} cells above threshold in {} ms",
        band.name,
        f_mhz,
        raster.finite_count(),
        band_started.elapsed().as_millis()
    );

    BandField {
        name: band.name.clone(),
        center_mhz: f_mhz,
        raster,
        top_contributions,
    }
}

/// Per-cell received power density of one source over the whole grid,
/// row-major W/m².
fn source_power_layer(
    source: &Source,
    f_mhz: f64,
    grid: &FieldGrid,
    environment: &Environment,
) -> Vec<f64> {
    let geometry = geodesy::geometry_layers(
        source.position.lat,
        source.position.lon,
        source.position.alt_m,
        grid.altitude_m,
        &grid.lat_axis,
        &grid.lon_axis,
    );

    let mut layer = vec![0.0f64; grid.cells()];
    let fill_row = |i: usize, row: &mut [f64]| {
        let base = i * grid.width;
        for (j, out) in row.iter_mut().enumerate() {
            let cell = base + j;
            let r_km = geometry.distance_km[cell];
            let gain_dbi = antenna::gain_dbi(
                &source.antenna,
                geometry.azimuth_deg[cell],
                geometry.elevation_deg[cell],
            );
            let fspl_db = propagation::free_space_loss_db(f_mhz, r_km);
            let extra_db = propagation::extra_loss_db(
                environment.propagation,
                &environment.atmosphere,
                f_mhz,
                r_km,
                source.position.alt_m,
                grid.altitude_m,
            );
            *out = power::power_density_w_per_m2(
                source.emission.eirp_dbm,
                gain_dbi,
                fspl_db,
                extra_db,
                r_km,
            );
        }
    };

    #[cfg(feature = "threading")]
    layer
        .par_chunks_mut(grid.width)
        .enumerate()
        .for_each(|(i, row)| fill_row(i, row));

    #[cfg(not(feature = "threading"))]
    for (i, row) in layer.chunks_mut(grid.width).enumerate() {
        fill_row(i, row);
    }

    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::{Antenna, Pattern, Pointing, Scan, ScanMode, SidelobeTemplate};
    use crate::propagation::{Atmosphere, GasLoss, PropagationModel};
    use crate::request::{
        Band, Emission, Environment, FieldRequest, GridParams, Polarisation, Position, Region,
        Source, SourceKind, Vertex,
    };
    use approx::assert_relative_eq;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn square_region(center_lat: f64, center_lon: f64, half_deg: f64) -> Region {
        Region {
            polygon: vec![
                Vertex { lat: center_lat + half_deg, lon: center_lon - half_deg },
                Vertex { lat: center_lat + half_deg, lon: center_lon + half_deg },
                Vertex { lat: center_lat - half_deg, lon: center_lon + half_deg },
                Vertex { lat: center_lat - half_deg, lon: center_lon - half_deg },
            ],
        }
    }

    fn radar(id: &str, lat: f64, lon: f64, eirp_dbm: f64) -> Source {
        Source {
            id: id.to_owned(),
            kind: SourceKind::Radar,
            position: Position { lat, lon, alt_m: 100.0 },
            emission: Emission {
                eirp_dbm,
                freq_mhz: 3000.0,
                bandwidth_mhz: 10.0,
                polarisation: Polarisation::H,
                duty_cycle: 1.0,
            },
            antenna: Antenna {
                pattern: Pattern {
                    hpbw_deg: 3.0,
                    vpbw_deg: 6.0,
                    sidelobe: SidelobeTemplate::MilStd20,
                },
                pointing: Pointing { az_deg: 0.0, el_deg: 0.0 },
                scan: Scan { mode: ScanMode::Circular, rpm: 12.0, sector_deg: 0.0 },
            },
        }
    }

    /// A quiet environment: free space, no gas/rain/fog, so analytic
    /// expectations stay exact.
    fn quiet_environment() -> Environment {
        Environment {
            propagation: PropagationModel::FreeSpace,
            atmosphere: Atmosphere {
                gas_loss: GasLoss::DbPerKm(0.0),
                rain_rate_mm_h: 0.0,
                fog_density_g_m3: 0.0,
            },
        }
    }

    fn base_request(sources: Vec<Source>, threshold_dbuv_per_m: f64) -> FieldRequest {
        FieldRequest {
            region: square_region(50.0, 10.0, 0.05),
            grid: GridParams { resolution_deg: 0.01, altitude_m: 100.0 },
            influence_buffer_km: 200.0,
            environment: quiet_environment(),
            bands: vec![Band {
                name: "S".to_owned(),
                f_min_mhz: 2900.0,
                f_max_mhz: 3100.0,
                ref_bandwidth_khz: 1000.0,
            }],
            sources,
            metric: "E_field_dBuV_per_m".to_owned(),
            combine_sources: "power_sum".to_owned(),
            temporal_agg: "peak".to_owned(),
            threshold_dbuv_per_m,
        }
    }

    #[test]
    fn single_radar_peaks_at_source_and_decays_radially() {
        let request = base_request(vec![radar("radar-1", 50.0, 10.0, 95.0)], -250.0);
        let result = compute_field(&request).unwrap();
        let band = result.band("S").unwrap();

        // The source sits on the centre cell of an 11×11 grid.
        let (ci, cj) = (5, 5);
        let peak = band.raster.get(ci, cj);
        assert_eq!(band.raster.max_value(), Some(peak));

        // Field decreases monotonically walking east from the source. The
        // easternmost column sits on the polygon boundary and is masked, so
        // stop one short of it.
        for j in cj..band.raster.width - 2 {
            assert!(
                band.raster.get(ci, j) > band.raster.get(ci, j + 1),
                "field must decay along the radial at column {j}"
            );
        }

        // Analytic spot check away from the source, straight from the
        // conversion chain (circular scan → 0 dBi everywhere).
        let lat = result.grid.origin_lat - ci as f64 * result.grid.resolution_deg;
        let lon = result.grid.origin_lon + 9.0 * result.grid.resolution_deg;
        let r_km = geodesy::haversine_km(50.0, 10.0, lat, lon);
        let expected = power::field_strength_dbuv_per_m(power::power_density_w_per_m2(
            95.0,
            0.0,
            propagation::free_space_loss_db(3000.0, r_km),
            0.0,
            r_km,
        ));
        assert_relative_eq!(f64::from(band.raster.get(ci, 9)), expected, epsilon = 1e-3);
    }

    #[test]
    fn ten_db_pair_splits_ten_to_one() {
        let request = base_request(
            vec![radar("strong", 50.0, 10.0, 95.0), radar("weak", 50.0, 10.0, 85.0)],
            -250.0,
        );
        let result = compute_field(&request).unwrap();
        let sample = result.point_query(50.03, 10.02, 100.0, "S").unwrap();

        assert_eq!(sample.top_contributions.len(), 2, "no third contributor exists");
        assert_eq!(sample.top_contributions[0].source_id, "strong");
        assert_relative_eq!(sample.top_contributions[0].fraction, 10.0 / 11.0, epsilon = 1e-9);
        assert_relative_eq!(sample.top_contributions[1].fraction, 1.0 / 11.0, epsilon = 1e-9);
    }

    #[test]
    fn unsupported_temporal_aggregation_is_rejected() {
        let mut request = base_request(vec![radar("radar-1", 50.0, 10.0, 95.0)], 40.0);
        request.temporal_agg = "average".to_owned();
        let err = compute_field(&request).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOption { .. }));
    }

    #[test]
    fn sources_beyond_buffer_leave_quiet_nan_rasters() {
        let mut request = base_request(vec![radar("far", 40.0, 10.0, 95.0)], 40.0);
        request.region = square_region(50.0, 10.0, 0.05);
        request.influence_buffer_km = 100.0;

        let result = compute_field(&request).unwrap();
        assert_eq!(result.sources_filtered, 1);
        assert!(result.source_ids.is_empty());
        let band = result.band("S").unwrap();
        assert_eq!(band.raster.finite_count(), 0);
        assert!(band.top_contributions.is_empty());
    }

    #[test]
    fn point_query_altitude_mismatch_is_rejected() {
        let request = base_request(vec![radar("radar-1", 50.0, 10.0, 95.0)], -250.0);
        let result = compute_field(&request).unwrap();
        let err = result.point_query(50.0, 10.0, 101.0, "S").unwrap_err();
        assert!(matches!(err, EngineError::QueryMismatch { .. }));
    }

    #[test]
    fn two_ray_model_shifts_the_field() {
        let free_space = base_request(vec![radar("radar-1", 50.0, 10.0, 95.0)], -250.0);
        let mut two_ray = free_space.clone();
        two_ray.environment.propagation = PropagationModel::TwoRayFlat;

        let a = compute_field(&free_space).unwrap();
        let b = compute_field(&two_ray).unwrap();
        let ra = &a.band("S").unwrap().raster;
        let rb = &b.band("S").unwrap().raster;

        let differing = ra
            .data
            .iter()
            .zip(rb.data.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite() && x != y)
            .count();
        assert!(differing > 0, "interference must move at least some cells");
    }

    #[test]
    fn mask_threshold_and_topk_stay_consistent() {
        // A threshold in the middle of the dynamic range splits the grid.
        let request = base_request(vec![radar("radar-1", 50.0, 10.0, 130.0)], 60.0);
        let result = compute_field(&request).unwrap();
        let band = result.band("S").unwrap();

        assert!(band.raster.finite_count() > 0, "some cells above threshold");
        assert!(
            band.raster.data.iter().any(|v| v.is_nan()),
            "some cells below threshold"
        );

        for i in 0..band.raster.height {
            for j in 0..band.raster.width {
                let value = band.raster.get(i, j);
                let rows: Vec<_> = band
                    .top_contributions
                    .iter()
                    .filter(|c| c.i == i && c.j == j)
                    .collect();
                if value.is_finite() {
                    assert!(f64::from(value) >= 60.0);
                    assert!(!rows.is_empty());
                    // Ranks are a prefix of {0, 1, 2}; fractions descend.
                    for (k, row) in rows.iter().enumerate() {
                        assert_eq!(row.rank as usize, k);
                        assert!(row.fraction > 0.0 && row.fraction <= 1.0);
                    }
                    let sum: f64 = rows.iter().map(|r| r.fraction).sum();
                    assert!(sum <= 1.0 + 1e-9);
                } else {
                    assert!(rows.is_empty(), "NaN cell ({i},{j}) must have no Top-K rows");
                }
            }
        }
    }

    #[test]
    fn swapping_two_sources_is_bitwise_identical() {
        let a = base_request(
            vec![radar("a", 50.01, 10.01, 95.0), radar("b", 49.99, 9.99, 92.0)],
            -250.0,
        );
        let mut b = a.clone();
        b.sources.reverse();

        let ra = compute_field(&a).unwrap();
        let rb = compute_field(&b).unwrap();

        let bits_a: Vec<u32> = ra.band("S").unwrap().raster.data.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = rb.band("S").unwrap().raster.data.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b, "power sums commute exactly for a pair");

        // Top-K is keyed by source id, so it is order-independent too.
        assert_eq!(
            ra.band("S").unwrap().top_contributions,
            rb.band("S").unwrap().top_contributions
        );
    }

    #[test]
    fn shuffled_source_order_agrees_within_tolerance() {
        let sources = vec![
            radar("a", 50.01, 10.01, 95.0),
            radar("b", 49.99, 9.99, 92.0),
            radar("c", 50.02, 9.98, 88.0),
            radar("d", 49.98, 10.03, 90.0),
        ];
        let request = base_request(sources.clone(), -250.0);
        let reference = compute_field(&request).unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..3 {
            let mut shuffled = sources.clone();
            shuffled.shuffle(&mut rng);
            let result = compute_field(&base_request(shuffled, -250.0)).unwrap();
            for (x, y) in reference
                .band("S")
                .unwrap()
                .raster
                .data
                .iter()
                .zip(result.band("S").unwrap().raster.data.iter())
            {
                if x.is_nan() {
                    assert!(y.is_nan(), "mask pattern must not depend on source order");
                } else {
                    assert_relative_eq!(*x, *y, max_relative = 1e-5);
                }
            }
        }
    }

    #[test]
    fn widening_the_buffer_never_drops_sources() {
        let sources = vec![
            radar("near", 50.0, 10.0, 95.0),
            radar("mid", 50.0, 11.0, 95.0),
            radar("far", 50.0, 12.5, 95.0),
        ];
        let vertices = square_region(50.0, 10.0, 0.05).vertices();

        let mut previous: Vec<String> = Vec::new();
        for buffer_km in [10.0, 80.0, 150.0, 400.0] {
            let (kept, _) = filter_sources(&sources, &vertices, buffer_km);
            let ids: Vec<String> = kept.iter().map(|s| s.id.clone()).collect();
            assert!(
                previous.iter().all(|id| ids.contains(id)),
                "buffer {buffer_km} km dropped a previously-kept source"
            );
            previous = ids;
        }
        assert_eq!(previous.len(), 3, "the widest buffer keeps everything");
    }

    #[test]
    fn source_ordering_survives_filtering() {
        let request = base_request(
            vec![
                radar("first", 50.0, 10.0, 95.0),
                radar("dropped", 40.0, 10.0, 95.0),
                radar("second", 50.01, 10.01, 95.0),
            ],
            -250.0,
        );
        let result = compute_field(&request).unwrap();
        assert_eq!(result.source_ids, vec!["first", "second"]);
        assert_eq!(result.sources_filtered, 1);
    }

    #[test]
    fn out_of_band_sources_do_not_contribute() {
        let mut uhf = radar("uhf", 50.0, 10.0, 95.0);
        uhf.emission.freq_mhz = 400.0;
        let mut request = base_request(vec![uhf], 40.0);
        request.bands.push(Band {
            name: "UHF".to_owned(),
            f_min_mhz: 300.0,
            f_max_mhz: 500.0,
            ref_bandwidth_khz: 100.0,
        });

        let result = compute_field(&request).unwrap();
        assert_eq!(result.band("S").unwrap().raster.finite_count(), 0);
        assert!(result.band("UHF").unwrap().raster.finite_count() > 0);
    }

    #[test]
    fn sliver_polygon_yields_empty_grid_without_error() {
        let mut request = base_request(vec![radar("radar-1", 50.02, 10.05, 95.0)], 40.0);
        request.region = Region {
            polygon: vec![
                Vertex { lat: 50.05, lon: 10.0 },
                Vertex { lat: 50.0, lon: 10.1 },
                Vertex { lat: 50.0, lon: 10.0 },
            ],
        };
        request.grid.resolution_deg = 0.1;

        let result = compute_field(&request).unwrap();
        let band = result.band("S").unwrap();
        assert_eq!(band.raster.finite_count(), 0, "no sample falls inside the sliver");
        assert!(band.top_contributions.is_empty());
    }

    #[test]
    fn grid_descriptor_matches_polygon_bounds() {
        let request = base_request(vec![radar("radar-1", 50.0, 10.0, 95.0)], 40.0);
        let result = compute_field(&request).unwrap();
        assert_eq!(result.grid.height, 11);
        assert_eq!(result.grid.width, 11);
        assert_relative_eq!(result.grid.origin_lat, 50.05, epsilon = 1e-9);
        assert_relative_eq!(result.grid.origin_lon, 9.95, epsilon = 1e-9);
        assert_relative_eq!(result.grid.altitude_m, 100.0);
    }
}
