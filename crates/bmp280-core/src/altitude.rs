//! Barometric altitude estimates (international standard atmosphere)

use libm::powf;

/// Mean sea-level pressure of the standard atmosphere, hPa
pub const SEA_LEVEL_PRESSURE_HPA: f32 = 1013.25;

/// Altitude in meters above the level where the pressure is `sea_level_hpa`.
///
/// Non-positive pressures are outside the formula's domain and give NaN.
pub fn altitude(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * (1.0 - powf(pressure_hpa / sea_level_hpa, 0.1903))
}

/// Sea-level pressure that makes `pressure_hpa` correspond to `altitude_m`.
///
/// Useful for calibrating [`altitude`] against a known elevation.
pub fn sea_level_pressure(pressure_hpa: f32, altitude_m: f32) -> f32 {
    pressure_hpa / powf(1.0 - altitude_m / 44330.0, 5.255)
}
