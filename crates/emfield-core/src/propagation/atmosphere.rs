//! Atmospheric specific attenuation: gaseous absorption, rain and fog.
//!
//! All three terms are design-level engineering fits, not full ITU-R
//! integrations: gas follows the classic CCIR two-gas closed form with the
//! 22 GHz water-vapour and 60 GHz oxygen peaks, rain the ITU-R P.838 power
//! law γ = k·R^α with log-interpolated coefficients, and fog a Rayleigh
//! liquid-water term. Each is monotone in its driving parameter, and all are
//! summed into a single dB/km figure the caller scales by range.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Standard surface water-vapour density used by the "auto" gas model, g/m³.
const WATER_VAPOUR_G_M3: f64 = 7.5;

/// Gaseous attenuation: either a caller-supplied figure or the sentinel
/// "auto" selecting the frequency-dependent model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GasLoss {
    Auto,
    DbPerKm(f64),
}

impl Default for GasLoss {
    fn default() -> Self {
        GasLoss::Auto
    }
}

impl Serialize for GasLoss {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            GasLoss::Auto => serializer.serialize_str("auto"),
            GasLoss::DbPerKm(v) => serializer.serialize_f64(v),
        }
    }
}

impl<'de> Deserialize<'de> for GasLoss {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GasLossVisitor;

        impl Visitor<'_> for GasLossVisitor {
            type Value = GasLoss;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a dB/km number or the string \"auto\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<GasLoss, E> {
                Ok(GasLoss::DbPerKm(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<GasLoss, E> {
                Ok(GasLoss::DbPerKm(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<GasLoss, E> {
                Ok(GasLoss::DbPerKm(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<GasLoss, E> {
                if v == "auto" {
                    Ok(GasLoss::Auto)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(GasLossVisitor)
    }
}

/// Atmosphere parameters of one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atmosphere {
    #[serde(default)]
    pub gas_loss: GasLoss,
    #[serde(default)]
    pub rain_rate_mm_h: f64,
    #[serde(default)]
    pub fog_density_g_m3: f64,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Atmosphere {
            gas_loss: GasLoss::Auto,
            rain_rate_mm_h: 0.0,
            fog_density_g_m3: 0.0,
        }
    }
}

impl Atmosphere {
    /// Combined specific attenuation at the given frequency, dB/km. A
    /// numeric gas override is taken literally, sign included.
    pub fn specific_attenuation_db_per_km(&self, f_mhz: f64) -> f64 {
        let gas = match self.gas_loss {
            GasLoss::Auto => gaseous_db_per_km(f_mhz),
            GasLoss::DbPerKm(v) => v,
        };
        gas + rain_db_per_km(f_mhz, self.rain_rate_mm_h)
            + fog_db_per_km(f_mhz, self.fog_density_g_m3)
    }
}

/// Clear-air gaseous attenuation, dB/km (CCIR closed form, f below 57 GHz
/// term structure; water-vapour term at 7.5 g/m³).
fn gaseous_db_per_km(f_mhz: f64) -> f64 {
    let f = f_mhz / 1000.0; // GHz

    let dry = (7.19e-3 + 6.09 / (f * f + 0.227) + 4.81 / ((f - 57.0).powi(2) + 1.50)) * f * f * 1e-3;

    let rho = WATER_VAPOUR_G_M3;
    let wet = (0.050
        + 0.0021 * rho
        + 3.6 / ((f - 22.2).powi(2) + 8.5)
        + 10.6 / ((f - 183.3).powi(2) + 9.0)
        + 8.9 / ((f - 325.4).powi(2) + 26.3))
        * f
        * f
        * rho
        * 1e-4;

    dry + wet
}

/// ITU-R P.838 coefficient rows (f_GHz, k, α), horizontal polarisation,
/// log-interpolated in frequency between rows.
const RAIN_COEFFS: [(f64, f64, f64); 11] = [
    (1.0, 3.87e-5, 0.912),
    (2.0, 1.54e-4, 0.963),
    (4.0, 6.50e-4, 1.121),
    (6.0, 1.75e-3, 1.308),
    (8.0, 4.54e-3, 1.327),
    (10.0, 1.01e-2, 1.276),
    (20.0, 7.51e-2, 1.099),
    (30.0, 1.87e-1, 1.021),
    (40.0, 3.50e-1, 0.939),
    (60.0, 7.07e-1, 0.826),
    (100.0, 1.12, 0.743),
];

/// Rain attenuation γ = k(f)·R^α(f), dB/km. Zero for zero rain.
fn rain_db_per_km(f_mhz: f64, rate_mm_h: f64) -> f64 {
    if rate_mm_h <= 0.0 {
        return 0.0;
    }

    let f = (f_mhz / 1000.0).clamp(RAIN_COEFFS[0].0, RAIN_COEFFS[RAIN_COEFFS.len() - 1].0);
    let hi = RAIN_COEFFS
        .iter()
        .position(|&(row_f, _, _)| f <= row_f)
        .unwrap_or(RAIN_COEFFS.len() - 1);

    let (k, alpha) = if hi == 0 {
        (RAIN_COEFFS[0].1, RAIN_COEFFS[0].2)
    } else {
        let (f0, k0, a0) = RAIN_COEFFS[hi - 1];
        let (f1, k1, a1) = RAIN_COEFFS[hi];
        let t = (f.ln() - f0.ln()) / (f1.ln() - f0.ln());
        ((k0.ln() + t * (k1.ln() - k0.ln())).exp(), a0 + t * (a1 - a0))
    };

    k * rate_mm_h.powf(alpha)
}

/// Fog/cloud liquid-water attenuation, dB/km: a Rayleigh-regime power-law
/// fit K_l ≈ 5.9·10⁻⁵·f^2.09 (dB/km per g/m³, f in GHz) scaled by content.
fn fog_db_per_km(f_mhz: f64, liquid_water_g_m3: f64) -> f64 {
    if liquid_water_g_m3 <= 0.0 {
        return 0.0;
    }
    let f = f_mhz / 1000.0;
    5.9e-5 * f.powf(2.09) * liquid_water_g_m3
}
