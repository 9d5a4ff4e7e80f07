//! Directional antenna gain with scan-peak semantics.
//!
//! Gains are relative to a 0 dBi mainlobe peak. The "peak over one scan
//! period" contract collapses the time dimension: a cell the mainlobe sweeps
//! across at any instant sees the full 0 dBi peak, a cell the scan never
//! reaches sees the static pattern (Gaussian mainlobe rolloff bounded below
//! by the sidelobe envelope template).

use serde::{Deserialize, Serialize};

/// Gaussian mainlobe coefficient: (10·log₁₀ e)·(4·ln 2) ≈ 12.04, so that the
/// rolloff reaches −3.01 dB at Δ = HPBW/2.
const MAINLOBE_COEFF_DB: f64 = 10.0 * std::f64::consts::LOG10_E * 4.0 * std::f64::consts::LN_2;

/// Sidelobe envelope templates, parameterised on the azimuthal off-axis
/// angle. Values are the floor in dB relative to the mainlobe peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SidelobeTemplate {
    #[serde(rename = "MIL-STD-20")]
    MilStd20,
    #[serde(rename = "RCS-13")]
    Rcs13,
    #[serde(rename = "Radar-Narrow-25")]
    RadarNarrow25,
    #[serde(rename = "Comm-Omni-Back-10")]
    CommOmniBack10,
}

impl SidelobeTemplate {
    /// Envelope floor in dB at the given azimuthal off-axis angle.
    pub fn floor_db(self, off_axis_az_deg: f64) -> f64 {
        let near = off_axis_az_deg.abs() < 10.0;
        match self {
            SidelobeTemplate::MilStd20 => -20.0,
            SidelobeTemplate::Rcs13 => {
                if near {
                    -13.0
                } else {
                    -20.0
                }
            }
            SidelobeTemplate::RadarNarrow25 => {
                if near {
                    -20.0
                } else {
                    -25.0
                }
            }
            SidelobeTemplate::CommOmniBack10 => -10.0,
        }
    }
}

/// Mechanical scan behaviour of the antenna.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    None,
    Circular,
    Sector,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::None
    }
}

/// Gaussian beam widths at the −3 dB points, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub hpbw_deg: f64,
    pub vpbw_deg: f64,
    pub sidelobe: SidelobeTemplate,
}

/// Boresight direction: azimuth clockwise from geographic north, elevation
/// above the horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pointing {
    pub az_deg: f64,
    #[serde(default)]
    pub el_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    #[serde(default)]
    pub mode: ScanMode,
    /// Rotation rate. Irrelevant under peak aggregation but part of the
    /// request contract.
    #[serde(default)]
    pub rpm: f64,
    /// Sector width for `mode = sector`, centred on the pointing azimuth.
    #[serde(default)]
    pub sector_deg: f64,
}

impl Default for Scan {
    fn default() -> Self {
        Scan {
            mode: ScanMode::None,
            rpm: 0.0,
            sector_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Antenna {
    pub pattern: Pattern,
    pub pointing: Pointing,
    #[serde(default)]
    pub scan: Scan,
}

/// Wrap an angle in degrees to (−180, 180].
pub fn wrap_deg(angle_deg: f64) -> f64 {
    let wrapped = (angle_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Whether a target bearing lies within the scan's coverage at some instant
/// of the scan period.
pub fn in_scan_coverage(bearing_deg: f64, antenna: &Antenna) -> bool {
    match antenna.scan.mode {
        ScanMode::None => false,
        ScanMode::Circular => true,
        ScanMode::Sector => {
            let off = wrap_deg(bearing_deg - antenna.pointing.az_deg).abs();
            off <= antenna.scan.sector_deg / 2.0
        }
    }
}

/// Peak gain in dBi towards a target at the given bearing and elevation.
///
/// In-coverage targets see the mainlobe peak (0 dBi). Out-of-coverage
/// targets see the static pattern: the tighter of the two per-axis Gaussian
/// rolloffs, floored by the sidelobe envelope.
pub fn gain_dbi(antenna: &Antenna, bearing_deg: f64, elevation_deg: f64) -> f64 {
    if in_scan_coverage(bearing_deg, antenna) {
        return 0.0;
    }

    let d_az = wrap_deg(bearing_deg - antenna.pointing.az_deg);
    let d_el = elevation_deg - antenna.pointing.el_deg;

    let g_az = -MAINLOBE_COEFF_DB * (d_az / antenna.pattern.hpbw_deg).powi(2);
    let g_el = -MAINLOBE_COEFF_DB * (d_el / antenna.pattern.vpbw_deg).powi(2);
    let mainlobe = g_az.min(g_el);

    mainlobe.max(antenna.pattern.sidelobe.floor_db(d_az))
}
