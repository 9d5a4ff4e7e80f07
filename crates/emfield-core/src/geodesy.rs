//! Spherical geometry under the effective-earth-radius model.
//!
//! All distances, bearings and elevation angles are evaluated on a sphere of
//! radius k·R_E with k = 4/3, which folds standard atmospheric refraction
//! into the geometry. Every function returns finite values for every input;
//! coincident points degrade to zero distance and an azimuth of 0°.

/// Mean earth radius (IUGG), km.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Effective-earth factor for standard refraction.
pub const EFFECTIVE_EARTH_FACTOR: f64 = 4.0 / 3.0;

/// Radius of the effective sphere, km.
pub const EFFECTIVE_RADIUS_KM: f64 = EARTH_RADIUS_KM * EFFECTIVE_EARTH_FACTOR;

/// Distance floor guarding ratios at source-coincident cells, km.
pub const MIN_DISTANCE_KM: f64 = 1e-6;

/// Great-circle distance in km between two geographic points, haversine
/// formula on the effective sphere.
pub fn haversine_km(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let phi1 = lat1_deg.to_radians();
    let phi2 = lat2_deg.to_radians();
    let dphi = (lat2_deg - lat1_deg).to_radians();
    let dlambda = (lon2_deg - lon1_deg).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EFFECTIVE_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Forward azimuth in degrees from point 1 towards point 2, clockwise from
/// geographic north, in [0, 360). Coincident points return 0.
pub fn forward_azimuth_deg(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    if lat1_deg == lat2_deg && lon1_deg == lon2_deg {
        return 0.0;
    }

    let phi1 = lat1_deg.to_radians();
    let phi2 = lat2_deg.to_radians();
    let dlambda = (lon2_deg - lon1_deg).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Apparent elevation angle in degrees from a source towards a target cell.
///
/// The target appears above the horizon by the altitude difference and below
/// it by the effective-earth curvature drop d²/(2·k·R_E):
///
///   elevation = atan(((alt_target − alt_source)/1000 − d²/(2·k·R_E)) / max(d, ε))
///
/// with d in km and altitudes in metres AMSL.
pub fn apparent_elevation_deg(distance_km: f64, source_alt_m: f64, target_alt_m: f64) -> f64 {
    let d = distance_km.max(MIN_DISTANCE_KM);
    let rise_km = (target_alt_m - source_alt_m) / 1000.0;
    let drop_km = d * d / (2.0 * EFFECTIVE_RADIUS_KM);
    ((rise_km - drop_km) / d).atan().to_degrees()
}

/// Per-cell geometry of one source against a full grid, row-major H×W.
pub struct GeometryLayers {
    pub distance_km: Vec<f64>,
    pub azimuth_deg: Vec<f64>,
    pub elevation_deg: Vec<f64>,
}

/// Evaluate distance, azimuth and elevation from a single source position to
/// every cell of a lat/lon axis grid. `lat_axis` runs north to south (rows),
/// `lon_axis` west to east (columns); output layers are row-major.
pub fn geometry_layers(
    source_lat_deg: f64,
    source_lon_deg: f64,
    source_alt_m: f64,
    target_alt_m: f64,
    lat_axis: &[f64],
    lon_axis: &[f64],
) -> GeometryLayers {
    let cells = lat_axis.len() * lon_axis.len();
    let mut layers = GeometryLayers {
        distance_km: vec![0.0; cells],
        azimuth_deg: vec![0.0; cells],
        elevation_deg: vec![0.0; cells],
    };

    let width = lon_axis.len();
    for (i, &lat) in lat_axis.iter().enumerate() {
        let row = i * width;
        for (j, &lon) in lon_axis.iter().enumerate() {
            let d = haversine_km(source_lat_deg, source_lon_deg, lat, lon);
            layers.distance_km[row + j] = d;
            layers.azimuth_deg[row + j] = forward_azimuth_deg(source_lat_deg, source_lon_deg, lat, lon);
            layers.elevation_deg[row + j] = apparent_elevation_deg(d, source_alt_m, target_alt_m);
        }
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn haversine_equator_degree_scaled_by_effective_factor() {
        // One degree of longitude on the equator spans (π/180)·k·R_E km.
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        let expected = EFFECTIVE_RADIUS_KM * std::f64::consts::PI / 180.0;
        assert_relative_eq!(d, expected, max_relative = 1e-12);
    }

    #[test]
    fn haversine_coincident_points_zero() {
        assert_eq!(haversine_km(45.0, 12.0, 45.0, 12.0), 0.0);
    }

    #[test]
    fn azimuth_cardinal_directions() {
        assert_relative_eq!(forward_azimuth_deg(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(forward_azimuth_deg(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
        assert_relative_eq!(forward_azimuth_deg(1.0, 0.0, 0.0, 0.0), 180.0, epsilon = 1e-9);
        assert_relative_eq!(forward_azimuth_deg(0.0, 1.0, 0.0, 0.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn azimuth_coincident_points_zero() {
        assert_eq!(forward_azimuth_deg(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn azimuth_always_in_range() {
        for lat in [-60.0, -10.0, 0.0, 35.0, 75.0] {
            for lon in [-170.0, -45.0, 0.0, 90.0, 179.0] {
                let az = forward_azimuth_deg(12.0, 34.0, lat, lon);
                assert!((0.0..360.0).contains(&az), "azimuth {az} out of range");
            }
        }
    }

    #[test]
    fn elevation_higher_target_is_positive_nearby() {
        // 1000 m above the source at 1 km range: ≈ 45° minus a negligible
        // curvature drop.
        let el = apparent_elevation_deg(1.0, 0.0, 1000.0);
        assert!(el > 44.0 && el < 45.1, "elevation {el}");
    }

    #[test]
    fn elevation_level_path_droops_with_distance() {
        // Equal altitudes: curvature drop alone pulls the target below the
        // horizontal, increasingly so with range.
        let near = apparent_elevation_deg(10.0, 500.0, 500.0);
        let far = apparent_elevation_deg(100.0, 500.0, 500.0);
        assert!(near < 0.0);
        assert!(far < near);
    }

    #[test]
    fn elevation_finite_at_zero_distance() {
        let el = apparent_elevation_deg(0.0, 0.0, 10_000.0);
        assert!(el.is_finite());
        assert!(el > 89.0, "a target straight above reads near +90°, got {el}");
    }

    #[test]
    fn geometry_layers_match_scalar_functions() {
        let lat_axis = [51.0, 50.9, 50.8];
        let lon_axis = [3.0, 3.1];
        let layers = geometry_layers(50.0, 2.0, 30.0, 1000.0, &lat_axis, &lon_axis);

        assert_eq!(layers.distance_km.len(), 6);
        let cell = 1 * 2 + 1; // (i=1, j=1)
        assert_eq!(
            layers.distance_km[cell],
            haversine_km(50.0, 2.0, 50.9, 3.1)
        );
        assert_eq!(
            layers.azimuth_deg[cell],
            forward_azimuth_deg(50.0, 2.0, 50.9, 3.1)
        );
        assert_eq!(
            layers.elevation_deg[cell],
            apparent_elevation_deg(layers.distance_km[cell], 30.0, 1000.0)
        );
    }
}
