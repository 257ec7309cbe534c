//! Converts raw sensor readings into pollutant concentrations.
//!
//! The conversion is done in two stages. The raw signal is first turned into
//! ppm via the sensor's power-law model, then ppm is turned into a mass
//! concentration in µg/m³ using the target gas' molar mass. Any reading that
//! cannot be converted to a plausible value yields `None`; the converter
//! never fails.

use crate::{calibration::CalibrationStore, error::AirScoutError};
use airscout_schemas::{
    calibration::CalibrationProfile,
    reading::{ConcentrationResult, RawSample},
    settings::ConversionLimits,
};

#[derive(Debug, Clone, Default)]
pub struct ConcentrationConverter {
    limits: ConversionLimits,
}

impl ConcentrationConverter {
    pub fn new(limits: ConversionLimits) -> Self {
        Self { limits }
    }

    /// Converts a raw reading into ppm.
    ///
    /// Returns `None` for non-finite or non-positive readings, ratios outside
    /// `(min_valid_ratio, max_valid_ratio]`, degenerate models and results
    /// outside `[0, max_realistic_ppm]`.
    pub fn to_ppm(&self, raw_value: f64, profile: &CalibrationProfile) -> Option<f64> {
        if !raw_value.is_finite() || raw_value <= 0.0 {
            return None;
        }
        if profile.r0 <= 0.0 || profile.a == 0.0 || profile.b == 0.0 {
            return None;
        }

        let ratio = raw_value / profile.r0;
        if !ratio.is_finite()
            || ratio <= self.limits.min_valid_ratio
            || ratio > self.limits.max_valid_ratio
        {
            return None;
        }

        let ppm = profile.a * ratio.powf(profile.b) * profile.calibration_factor;
        if !ppm.is_finite() || ppm < 0.0 || ppm > self.limits.max_realistic_ppm {
            return None;
        }

        Some(round_to(ppm, self.limits.decimal_places))
    }

    /// Converts a ppm value into µg/m³.
    pub fn to_ugm3(&self, ppm: f64, profile: &CalibrationProfile) -> Option<f64> {
        if !ppm.is_finite() || ppm < 0.0 || profile.molar_mass <= 0.0 {
            return None;
        }

        let ugm3 = ppm * (profile.molar_mass / self.limits.molar_volume_stp)
            * self.limits.ppm_to_ugm3_factor;
        if !ugm3.is_finite() || ugm3 < 0.0 || ugm3 > self.limits.max_realistic_ugm3 {
            return None;
        }

        Some(round_to(ugm3, self.limits.decimal_places))
    }

    pub fn convert(&self, raw_value: f64, profile: &CalibrationProfile) -> ConcentrationResult {
        let ppm = self.to_ppm(raw_value, profile);
        let ugm3 = ppm.and_then(|ppm| self.to_ugm3(ppm, profile));
        ConcentrationResult { ppm, ugm3 }
    }

    /// Converts a single reading, looking up its sensor's calibration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` if the sensor has no calibration profile.
    pub fn convert_sample(
        &self,
        sample: &RawSample,
        store: &CalibrationStore,
    ) -> Result<ConcentrationResult, AirScoutError> {
        let profile = store.require(&sample.sensor_id)?;
        Ok(self.convert(sample.raw_value, profile))
    }

    /// Converts a whole channel. Missing readings stay missing.
    pub fn convert_series(
        &self,
        raw: &[Option<f64>],
        profile: &CalibrationProfile,
    ) -> Vec<ConcentrationResult> {
        raw.iter()
            .map(|value| match value {
                Some(v) => self.convert(*v, profile),
                None => ConcentrationResult::INVALID,
            })
            .collect()
    }
}

/// Rounds half away from zero to `places` decimal places.
///
/// This is not banker's rounding: an exact tie such as `0.125` at two places
/// becomes `0.13`, where a round-half-to-even rule would give `0.12`. Values
/// that land exactly on a tie can therefore differ in the last digit from
/// tools that round half to even.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}
