//! Request data model and boundary validation.
//!
//! The request is an immutable bundle deserialised from JSON. Option
//! surfaces with more than one legal value (propagation model, scan mode,
//! sidelobe template, polarisation) are tagged enums; policy-locked options
//! (metric, combine mode, temporal aggregation) arrive as strings and are
//! checked against their single accepted spelling so that a contract-valid
//! but unsupported request is reported as such rather than failing to parse.

use serde::{Deserialize, Serialize};

use crate::antenna::{Antenna, ScanMode};
use crate::error::EngineError;
use crate::geodesy;
use crate::grid::{effective_len, polygon_bounds};
use crate::propagation::{Atmosphere, PropagationModel};

/// Hard cap on the number of sources per request.
pub const MAX_SOURCES: usize = 50;

/// Maximum region extent along either axis, km (measured on the effective
/// sphere, like every other distance in the engine).
pub const MAX_REGION_EXTENT_KM: f64 = 200.0;

/// Default no-data threshold, dBμV/m.
pub const DEFAULT_THRESHOLD_DBUV_PER_M: f64 = 40.0;

const METRIC_E_FIELD: &str = "E_field_dBuV_per_m";
const COMBINE_POWER_SUM: &str = "power_sum";
const TEMPORAL_PEAK: &str = "peak";

/// A polygon vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub lat: f64,
    pub lon: f64,
}

/// The region of interest: a closed clockwise polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub polygon: Vec<Vertex>,
}

impl Region {
    /// Vertices as (lat, lon) pairs, for the geometry helpers.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        self.polygon.iter().map(|v| (v.lat, v.lon)).collect()
    }
}

/// Sample-grid parameters: one shared lat/lon cell size and a single AMSL
/// altitude slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub resolution_deg: f64,
    pub altitude_m: f64,
}

/// Propagation environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub propagation: PropagationModel,
    #[serde(default)]
    pub atmosphere: Atmosphere,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            propagation: PropagationModel::FreeSpace,
            atmosphere: Atmosphere::default(),
        }
    }
}

/// A named frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub f_min_mhz: f64,
    pub f_max_mhz: f64,
    pub ref_bandwidth_khz: f64,
}

impl Band {
    pub fn center_mhz(&self) -> f64 {
        0.5 * (self.f_min_mhz + self.f_max_mhz)
    }

    /// Whether an emission interval [centre − bw/2, centre + bw/2] overlaps
    /// this band.
    pub fn overlaps(&self, emission_freq_mhz: f64, emission_bw_mhz: f64) -> bool {
        let half = emission_bw_mhz.max(0.0) / 2.0;
        emission_freq_mhz + half >= self.f_min_mhz && emission_freq_mhz - half <= self.f_max_mhz
    }
}

/// Source category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Radar,
    Comms,
    Jammer,
}

/// Wave polarisation. Carried through the contract; the propagation baseline
/// does not differentiate (per-polarisation reflection is a non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarisation {
    H,
    V,
    #[serde(rename = "RHCP")]
    Rhcp,
    #[serde(rename = "LHCP")]
    Lhcp,
}

/// Geographic position of a source, AMSL altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

/// Emission parameters of a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub eirp_dbm: f64,
    pub freq_mhz: f64,
    pub bandwidth_mhz: f64,
    pub polarisation: Polarisation,
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
}

fn default_duty_cycle() -> f64 {
    1.0
}

/// One radiating source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    pub position: Position,
    pub emission: Emission,
    pub antenna: Antenna,
}

/// The full request bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRequest {
    pub region: Region,
    pub grid: GridParams,
    pub influence_buffer_km: f64,
    #[serde(default)]
    pub environment: Environment,
    pub bands: Vec<Band>,
    pub sources: Vec<Source>,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_combine")]
    pub combine_sources: String,
    #[serde(default = "default_temporal")]
    pub temporal_agg: String,
    #[serde(default = "default_threshold")]
    pub threshold_dbuv_per_m: f64,
}

fn default_metric() -> String {
    METRIC_E_FIELD.to_owned()
}

fn default_combine() -> String {
    COMBINE_POWER_SUM.to_owned()
}

fn default_temporal() -> String {
    TEMPORAL_PEAK.to_owned()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_DBUV_PER_M
}

impl FieldRequest {
    /// Parse a request from JSON, mapping parse failures onto the request
    /// error kind.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::invalid("request", e.to_string()))
    }

    /// Validate the full contract. Returns the first violation found, with
    /// its field path.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.validate_locked_options()?;
        self.validate_region()?;
        self.validate_grid()?;
        self.validate_bands()?;
        self.validate_sources()?;

        if !self.influence_buffer_km.is_finite() || self.influence_buffer_km < 0.0 {
            return Err(EngineError::invalid(
                "influence_buffer_km",
                "must be a non-negative distance",
            ));
        }
        if !self.threshold_dbuv_per_m.is_finite() {
            return Err(EngineError::invalid("threshold_dbuv_per_m", "must be finite"));
        }
        Ok(())
    }

    fn validate_locked_options(&self) -> Result<(), EngineError> {
        if self.metric != METRIC_E_FIELD {
            return Err(EngineError::unsupported("metric", self.metric.as_str()));
        }
        if self.combine_sources != COMBINE_POWER_SUM {
            return Err(EngineError::unsupported("combine_sources", self.combine_sources.as_str()));
        }
        if self.temporal_agg != TEMPORAL_PEAK {
            return Err(EngineError::unsupported("temporal_agg", self.temporal_agg.as_str()));
        }
        Ok(())
    }

    fn validate_region(&self) -> Result<(), EngineError> {
        let vertices = self.region.vertices();
        let n = effective_len(&vertices);
        if n < 3 {
            return Err(EngineError::invalid(
                "region.polygon",
                format!("needs at least 3 vertices, got {n}"),
            ));
        }
        for (k, v) in self.region.polygon.iter().enumerate() {
            if !v.lat.is_finite() || !v.lon.is_finite() || v.lat.abs() > 90.0 || v.lon.abs() > 180.0
            {
                return Err(EngineError::invalid(
                    format!("region.polygon[{k}]"),
                    "coordinates out of range",
                ));
            }
        }
        if signed_area(&vertices[..n]) >= 0.0 {
            return Err(EngineError::invalid(
                "region.polygon",
                "vertices must be listed clockwise",
            ));
        }
        if self_intersects(&vertices[..n]) {
            return Err(EngineError::invalid(
                "region.polygon",
                "polygon must not self-intersect",
            ));
        }

        let (lat_min, lat_max, lon_min, lon_max) = polygon_bounds(&vertices);
        let mid_lat = 0.5 * (lat_min + lat_max);
        let mid_lon = 0.5 * (lon_min + lon_max);
        let ns_km = geodesy::haversine_km(lat_min, mid_lon, lat_max, mid_lon);
        let ew_km = geodesy::haversine_km(mid_lat, lon_min, mid_lat, lon_max);
        if ns_km > MAX_REGION_EXTENT_KM || ew_km > MAX_REGION_EXTENT_KM {
            return Err(EngineError::invalid(
                "region.polygon",
                format!(
                    "region spans {ns_km:.1} × {ew_km:.1} km, limit is {MAX_REGION_EXTENT_KM} km per axis"
                ),
            ));
        }
        Ok(())
    }

    fn validate_grid(&self) -> Result<(), EngineError> {
        if !self.grid.resolution_deg.is_finite() || self.grid.resolution_deg <= 0.0 {
            return Err(EngineError::invalid(
                "grid.resolution_deg",
                "must be a positive cell size in degrees",
            ));
        }
        if !self.grid.altitude_m.is_finite() {
            return Err(EngineError::invalid("grid.altitude_m", "must be finite"));
        }
        Ok(())
    }

    fn validate_bands(&self) -> Result<(), EngineError> {
        for (k, band) in self.bands.iter().enumerate() {
            if band.name.is_empty() {
                return Err(EngineError::invalid(format!("bands[{k}].name"), "must not be empty"));
            }
            if self.bands[..k].iter().any(|b| b.name == band.name) {
                return Err(EngineError::invalid(
                    format!("bands[{k}].name"),
                    format!("duplicate band name {:?}", band.name),
                ));
            }
            if !band.f_min_mhz.is_finite()
                || !band.f_max_mhz.is_finite()
                || band.f_min_mhz <= 0.0
                || band.f_min_mhz >= band.f_max_mhz
            {
                return Err(EngineError::invalid(
                    format!("bands[{k}].f_min_mhz"),
                    "band requires 0 < f_min < f_max",
                ));
            }
            if !(band.ref_bandwidth_khz > 0.0) {
                return Err(EngineError::invalid(
                    format!("bands[{k}].ref_bandwidth_khz"),
                    "must be positive",
                ));
            }
        }
        Ok(())
    }

    fn validate_sources(&self) -> Result<(), EngineError> {
        if self.sources.len() > MAX_SOURCES {
            return Err(EngineError::invalid(
                "sources",
                format!("{} sources exceed the limit of {MAX_SOURCES}", self.sources.len()),
            ));
        }
        for (k, source) in self.sources.iter().enumerate() {
            let path = |field: &str| format!("sources[{k}].{field}");
            if source.id.is_empty() {
                return Err(EngineError::invalid(path("id"), "must not be empty"));
            }
            let p = &source.position;
            if !p.lat.is_finite()
                || !p.lon.is_finite()
                || !p.alt_m.is_finite()
                || p.lat.abs() > 90.0
                || p.lon.abs() > 180.0
            {
                return Err(EngineError::invalid(path("position"), "coordinates out of range"));
            }
            let e = &source.emission;
            if !e.eirp_dbm.is_finite() {
                return Err(EngineError::invalid(path("emission.eirp_dbm"), "must be finite"));
            }
            if !(e.freq_mhz > 0.0) {
                return Err(EngineError::invalid(path("emission.freq_mhz"), "must be positive"));
            }
            if !(e.bandwidth_mhz >= 0.0) {
                return Err(EngineError::invalid(
                    path("emission.bandwidth_mhz"),
                    "must be non-negative",
                ));
            }
            if !(0.0..=1.0).contains(&e.duty_cycle) {
                return Err(EngineError::invalid(
                    path("emission.duty_cycle"),
                    "must be within [0, 1]",
                ));
            }
            let a = &source.antenna;
            if !(a.pattern.hpbw_deg > 0.0) || !(a.pattern.vpbw_deg > 0.0) {
                return Err(EngineError::invalid(
                    path("antenna.pattern"),
                    "beamwidths must be positive",
                ));
            }
            if !a.pointing.az_deg.is_finite() || !a.pointing.el_deg.is_finite() {
                return Err(EngineError::invalid(path("antenna.pointing"), "must be finite"));
            }
            if a.scan.rpm < 0.0 {
                return Err(EngineError::invalid(path("antenna.scan.rpm"), "must be non-negative"));
            }
            if a.scan.mode == ScanMode::Sector && !(a.scan.sector_deg > 0.0) {
                return Err(EngineError::invalid(
                    path("antenna.scan.sector_deg"),
                    "sector scan requires a positive width",
                ));
            }
        }
        Ok(())
    }
}

/// Shoelace signed area in the (lon, lat) plane. Positive for
/// counter-clockwise vertex order.
fn signed_area(vertices: &[(f64, f64)]) -> f64 {
    let n = vertices.len();
    let mut sum = 0.0;
    for k in 0..n {
        let (lat0, lon0) = vertices[k];
        let (lat1, lon1) = vertices[(k + 1) % n];
        sum += lon0 * lat1 - lon1 * lat0;
    }
    0.5 * sum
}

/// O(n²) proper-intersection test over non-adjacent edge pairs.
fn self_intersects(vertices: &[(f64, f64)]) -> bool {
    let n = vertices.len();
    for a in 0..n {
        let a2 = (a + 1) % n;
        for b in a + 1..n {
            let b2 = (b + 1) % n;
            // Skip edges sharing a vertex.
            if a == b || a2 == b || a == b2 {
                continue;
            }
            if segments_cross(vertices[a], vertices[a2], vertices[b], vertices[b2]) {
                return true;
            }
        }
    }
    false
}

fn segments_cross(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.1 - a.1) * (c.0 - a.0) - (b.0 - a.0) * (c.1 - a.1)
}
