//! Path-loss models: free-space spreading plus the optional two-ray
//! flat-earth interference term and atmospheric extras.
//!
//! The two-ray term is a *delta applied on top of* free-space loss, matching
//! the additional-loss convention of the service API this engine backs. It
//! may be negative (constructive interference) or positive (destructive) and
//! is clamped to ±40 dB to keep the destructive nulls finite.

pub mod atmosphere;

pub use atmosphere::{Atmosphere, GasLoss};

use serde::{Deserialize, Serialize};

use crate::geodesy::MIN_DISTANCE_KM;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Inside this many wavelengths the ray-optics two-ray model is invalid;
/// the coherent term is replaced by 0 dB.
const NEAR_FIELD_WAVELENGTHS: f64 = 10.0;

/// Symmetric clamp on the two-ray delta, dB.
const TWO_RAY_CLAMP_DB: f64 = 40.0;

/// Ratio floor guarding the log of a perfect destructive null.
const MIN_FIELD_RATIO: f64 = 1e-9;

/// Propagation model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationModel {
    FreeSpace,
    TwoRayFlat,
}

impl Default for PropagationModel {
    fn default() -> Self {
        PropagationModel::FreeSpace
    }
}

/// Free-space path loss in dB:
///
///   FSPL = 32.45 + 20·log₁₀(f_MHz) + 20·log₁₀(max(r_km, 10⁻⁶))
pub fn free_space_loss_db(f_mhz: f64, r_km: f64) -> f64 {
    32.45 + 20.0 * f_mhz.log10() + 20.0 * r_km.max(MIN_DISTANCE_KM).log10()
}

/// Two-ray flat-earth additional loss in dB relative to free space.
///
/// Both terminals stand at their AMSL altitudes over a perfectly flat
/// reflector with reflection coefficient −1 (magnitude 1, 180° phase, the
/// horizontal-polarisation baseline). Direct and ground-reflected paths
///
///   d1 = √(r² + (h_t − h_r)²),  d2 = √(r² + (h_t + h_r)²)
///
/// combine coherently; the delta is −20·log₁₀ |1 − (d1/d2)·e^(−jΔφ)| with
/// Δφ = 2π(d2 − d1)/λ. Receivers in the near field (r < 10λ) take 0 dB.
pub fn two_ray_delta_db(f_mhz: f64, r_km: f64, tx_alt_m: f64, rx_alt_m: f64) -> f64 {
    let wavelength_m = SPEED_OF_LIGHT_M_PER_S / (f_mhz * 1e6);
    let r_m = r_km * 1000.0;
    if r_m < NEAR_FIELD_WAVELENGTHS * wavelength_m {
        return 0.0;
    }

    let h_diff = tx_alt_m - rx_alt_m;
    let h_sum = tx_alt_m + rx_alt_m;
    let d1 = (r_m * r_m + h_diff * h_diff).sqrt();
    let d2 = (r_m * r_m + h_sum * h_sum).sqrt();

    let phase = 2.0 * std::f64::consts::PI * (d2 - d1) / wavelength_m;
    let amplitude = d1 / d2;
    let re = 1.0 - amplitude * phase.cos();
    let im = amplitude * phase.sin();
    let ratio = (re * re + im * im).sqrt();

    let delta = -20.0 * ratio.max(MIN_FIELD_RATIO).log10();
    delta.clamp(-TWO_RAY_CLAMP_DB, TWO_RAY_CLAMP_DB)
}

/// Everything the caller adds to FSPL for one path: the two-ray delta (0 for
/// free space) plus atmospheric attenuation scaled by range.
pub fn extra_loss_db(
    model: PropagationModel,
    atmosphere: &Atmosphere,
    f_mhz: f64,
    r_km: f64,
    tx_alt_m: f64,
    rx_alt_m: f64,
) -> f64 {
    let two_ray = match model {
        PropagationModel::FreeSpace => 0.0,
        PropagationModel::TwoRayFlat => two_ray_delta_db(f_mhz, r_km, tx_alt_m, rx_alt_m),
    };
    two_ray + atmosphere.specific_attenuation_db_per_km(f_mhz) * r_km
}
