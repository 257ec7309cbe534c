use serde::{Deserialize, Serialize};

/// One row of a piecewise-linear AQI table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqiBreakpoint {
    pub conc_low: f64,
    pub conc_high: f64,
    pub aqi_low: u16,
    pub aqi_high: u16,
}

impl AqiBreakpoint {
    pub const fn new(conc_low: f64, conc_high: f64, aqi_low: u16, aqi_high: u16) -> Self {
        Self {
            conc_low,
            conc_high,
            aqi_low,
            aqi_high,
        }
    }
}

/// The breakpoint table of a single pollutant, concentrations in µg/m³.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiBreakpointTable {
    pub pollutant: String,
    pub breakpoints: Vec<AqiBreakpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiCategory {
    pub aqi_low: u16,
    pub aqi_high: u16,
    pub name: String,
    pub color: String,
    pub description: String,
}

/// Maps a sensor channel onto the pollutant whose table is used for its AQI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPollutant {
    pub sensor_id: String,
    pub pollutant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiResult {
    pub aqi: u16,
    pub category: String,
    pub color: String,
    pub description: String,
}

impl AqiResult {
    pub const UNKNOWN_CATEGORY: &'static str = "Unknown";

    /// The result reported when no AQI can be derived for a concentration.
    pub fn unknown() -> Self {
        Self {
            aqi: 0,
            category: Self::UNKNOWN_CATEGORY.to_string(),
            color: "Grey".to_string(),
            description: "No valid data".to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.category == Self::UNKNOWN_CATEGORY
    }
}
