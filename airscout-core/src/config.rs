use crate::{
    aqi::AqiEngine,
    calibration::{self, CalibrationStore},
    error::AirScoutError,
};
use airscout_schemas::settings::AnalysisSettings;

/// The complete, immutable configuration of a pipeline run.
///
/// It is built once at start-up and shared by reference with every batch.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub calibration: CalibrationStore,
    pub aqi: AqiEngine,
    pub settings: AnalysisSettings,
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any analysis setting is out of range.
    pub fn new(
        calibration: CalibrationStore,
        aqi: AqiEngine,
        settings: AnalysisSettings,
    ) -> Result<Self, AirScoutError> {
        validate_settings(&settings)?;
        Ok(Self {
            calibration,
            aqi,
            settings,
        })
    }

    /// Returns a copy with replaced analysis settings, validating them.
    pub fn with_settings(&self, settings: AnalysisSettings) -> Result<Self, AirScoutError> {
        Self::new(self.calibration.clone(), self.aqi.clone(), settings)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let calibration = CalibrationStore::new(calibration::default_profiles())
            .unwrap_or_default();
        Self {
            calibration,
            aqi: AqiEngine::default(),
            settings: AnalysisSettings::default(),
        }
    }
}

pub fn validate_settings(settings: &AnalysisSettings) -> Result<(), AirScoutError> {
    let fail = |msg: String| Err(AirScoutError::InvalidConfiguration(msg));

    let conversion = &settings.conversion;
    if !(conversion.max_valid_ratio > conversion.min_valid_ratio) {
        return fail(format!(
            "max_valid_ratio ({}) must be greater than min_valid_ratio ({})",
            conversion.max_valid_ratio, conversion.min_valid_ratio
        ));
    }
    if !(conversion.molar_volume_stp > 0.0) {
        return fail("molar_volume_stp must be positive".to_string());
    }
    if !(conversion.max_realistic_ppm > 0.0 && conversion.max_realistic_ugm3 > 0.0) {
        return fail("realistic concentration limits must be positive".to_string());
    }
    if conversion.decimal_places > 12 {
        return fail("decimal_places must be at most 12".to_string());
    }
    if settings.smoothing.span == 0 {
        return fail("EMA span must be at least 1".to_string());
    }
    if !(settings.outliers.zscore_threshold > 0.0) {
        return fail("z-score threshold must be positive".to_string());
    }
    if settings.events.window == 0 {
        return fail("gas event window must be at least 1".to_string());
    }
    if !(settings.events.multiplier > 0.0) {
        return fail("gas event multiplier must be positive".to_string());
    }
    let contamination = settings.anomaly.contamination;
    if !(contamination > 0.0 && contamination <= 0.5) {
        return fail(format!("contamination must be in (0, 0.5], got {}", contamination));
    }
    if settings.anomaly.estimators == 0 {
        return fail("anomaly estimators must be at least 1".to_string());
    }
    if settings.channels.gas_sensor_prefix.is_empty() {
        return fail("gas sensor prefix must not be empty".to_string());
    }
    Ok(())
}
