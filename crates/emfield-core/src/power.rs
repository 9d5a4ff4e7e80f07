//! Power-density and field-strength conversions.
//!
//! Per source, per cell:
//!
//!   EIRP_W   = 10^((EIRP_dBm − 30)/10)
//!   gain_lin = 10^(gain_dBi/10)
//!   loss_lin = 10^(−(FSPL + extra)/10)
//!   S        = EIRP_W · gain_lin / (4π · r_m²) · loss_lin
//!
//! and for the accumulated total:
//!
//!   E = √(Z₀ · S_tot),  E_dBμV/m = 20·log₁₀(max(E, 10⁻¹⁵)) + 120

/// Impedance of free space, ohms.
pub const FREE_SPACE_IMPEDANCE_OHM: f64 = 377.0;

/// Range floor in metres guarding the source-coincident cell (the 10⁻⁶ km
/// geometry floor expressed in metres).
const MIN_RANGE_M: f64 = 1e-3;

/// Field floor in V/m guarding the log of a perfectly quiet cell.
const MIN_FIELD_V_PER_M: f64 = 1e-15;

/// Received power density in W/m² for one source at one cell.
pub fn power_density_w_per_m2(
    eirp_dbm: f64,
    gain_dbi: f64,
    fspl_db: f64,
    extra_loss_db: f64,
    r_km: f64,
) -> f64 {
    let eirp_w = 10f64.powf((eirp_dbm - 30.0) / 10.0);
    let gain_lin = 10f64.powf(gain_dbi / 10.0);
    let loss_lin = 10f64.powf(-(fspl_db + extra_loss_db) / 10.0);
    let r_m = (r_km * 1000.0).max(MIN_RANGE_M);
    eirp_w * gain_lin / (4.0 * std::f64::consts::PI * r_m * r_m) * loss_lin
}

/// Field strength in dBμV/m for an accumulated power density in W/m².
pub fn field_strength_dbuv_per_m(s_total_w_per_m2: f64) -> f64 {
    let e_v_per_m = (FREE_SPACE_IMPEDANCE_OHM * s_total_w_per_m2.max(0.0)).sqrt();
    20.0 * e_v_per_m.max(MIN_FIELD_V_PER_M).log10() + 120.0
}
