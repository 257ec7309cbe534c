use crate::{
    aqi::{AqiBreakpointTable, AqiCategory, SensorPollutant},
    calibration::CalibrationProfile,
    settings::AnalysisSettings,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub schema_version: String,
    pub sensors: Vec<CalibrationProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AqiFile {
    pub schema_version: String,
    #[serde(default)]
    pub breakpoints: Vec<AqiBreakpointTable>,
    #[serde(default)]
    pub categories: Vec<AqiCategory>,
    #[serde(default)]
    pub sensor_pollutants: Vec<SensorPollutant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisFile {
    pub schema_version: String,
    #[serde(flatten)]
    pub settings: AnalysisSettings,
}
