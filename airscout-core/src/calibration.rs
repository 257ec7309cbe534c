use crate::error::AirScoutError;
use airscout_schemas::calibration::CalibrationProfile;
use std::collections::HashMap;

/// Immutable lookup of calibration profiles by sensor id.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    profiles: HashMap<String, CalibrationProfile>,
}

impl CalibrationStore {
    /// Builds a store from a list of profiles. Later entries replace earlier
    /// ones with the same sensor id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a profile has a non-positive or
    /// non-finite `r0`, or a non-finite coefficient or molar mass.
    pub fn new(profiles: Vec<CalibrationProfile>) -> Result<Self, AirScoutError> {
        let mut map = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            validate_profile(&profile)?;
            map.insert(profile.sensor_id.clone(), profile);
        }
        Ok(Self { profiles: map })
    }

    pub fn get(&self, sensor_id: &str) -> Option<&CalibrationProfile> {
        self.profiles.get(sensor_id)
    }

    /// Like `get`, but reports a missing profile as `ConfigurationMissing`.
    pub fn require(&self, sensor_id: &str) -> Result<&CalibrationProfile, AirScoutError> {
        self.get(sensor_id)
            .ok_or_else(|| AirScoutError::ConfigurationMissing(sensor_id.to_string()))
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.profiles.contains_key(sensor_id)
    }

    /// Sensor ids in a stable, sorted order.
    pub fn sensor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Replaces or adds the given profiles, keeping every other entry.
    pub fn merged_with(&self, overrides: Vec<CalibrationProfile>) -> Result<Self, AirScoutError> {
        let mut profiles: Vec<CalibrationProfile> = self.profiles.values().cloned().collect();
        profiles.extend(overrides);
        Self::new(profiles)
    }
}

fn validate_profile(profile: &CalibrationProfile) -> Result<(), AirScoutError> {
    if !(profile.r0.is_finite() && profile.r0 > 0.0) {
        return Err(AirScoutError::InvalidConfiguration(format!(
            "sensor '{}' must have a positive R0, got {}",
            profile.sensor_id, profile.r0
        )));
    }
    let coefficients = [
        ("a", profile.a),
        ("b", profile.b),
        ("calibration_factor", profile.calibration_factor),
        ("molar_mass", profile.molar_mass),
    ];
    if let Some((name, value)) = coefficients.iter().find(|(_, v)| !v.is_finite()) {
        return Err(AirScoutError::InvalidConfiguration(format!(
            "sensor '{}' has a non-finite {}: {}",
            profile.sensor_id, name, value
        )));
    }
    if profile.molar_mass <= 0.0 {
        return Err(AirScoutError::InvalidConfiguration(format!(
            "sensor '{}' must have a positive molar mass",
            profile.sensor_id
        )));
    }
    Ok(())
}

/// The calibration of the MQ sensor array used for the forest reference run.
pub fn default_profiles() -> Vec<CalibrationProfile> {
    vec![
        CalibrationProfile::new("MQ2", 2000.0, 100.0, -1.5, 0.01, 44.0),
        CalibrationProfile::new("MQ3", 1800.0, 50.0, -1.3, 0.02, 46.0),
        CalibrationProfile::new("MQ4", 2200.0, 80.0, -1.4, 0.015, 16.0),
        CalibrationProfile::new("MQ5", 2000.0, 90.0, -1.6, 0.01, 44.0),
        CalibrationProfile::new("MQ6", 1900.0, 85.0, -1.5, 0.01, 44.0),
        CalibrationProfile::new("MQ7", 2500.0, 60.0, -1.2, 0.005, 28.0),
        CalibrationProfile::new("MQ8", 1700.0, 70.0, -1.4, 0.02, 2.0),
        CalibrationProfile::new("MQ9", 2100.0, 75.0, -1.3, 0.008, 28.0),
        CalibrationProfile::new("MQ135", 3000.0, 40.0, -1.1, 0.003, 46.0),
    ]
}
