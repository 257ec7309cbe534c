//! Defines the per-sensor calibration data used to turn a raw MQ-sensor reading
//! into a pollutant concentration.

use serde::{Deserialize, Serialize};

/// The static calibration of a single sensor.
///
/// The concentration model is the usual power law of metal-oxide gas sensors,
/// `ppm = a * (Rs / R0)^b * calibration_factor`, followed by the ideal gas
/// conversion to a mass concentration using `molar_mass`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// The column / channel name of the sensor (e.g. "MQ135").
    pub sensor_id: String,
    /// The sensor resistance in clean air. Must be strictly positive.
    pub r0: f64,
    /// Scale coefficient of the power-law model.
    pub a: f64,
    /// Exponent of the power-law model, typically negative.
    pub b: f64,
    /// Empirical correction applied on top of the power-law model.
    pub calibration_factor: f64,
    /// Molar mass of the target gas in g/mol.
    pub molar_mass: f64,
}

impl CalibrationProfile {
    pub fn new(sensor_id: &str, r0: f64, a: f64, b: f64, calibration_factor: f64, molar_mass: f64) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            r0,
            a,
            b,
            calibration_factor,
            molar_mass,
        }
    }
}
