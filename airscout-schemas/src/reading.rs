//! Raw sensor readings and the records derived from them.
//!
//! A value of `None` marks a measurement that could not be derived. Rows are
//! never dropped, so every derived column keeps the row count of its input.

use serde::{Deserialize, Serialize};

/// A single reading of one sensor channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub sensor_id: String,
    pub timestamp: String,
    pub raw_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConcentrationResult {
    pub ppm: Option<f64>,
    pub ugm3: Option<f64>,
}

impl ConcentrationResult {
    pub const INVALID: Self = Self { ppm: None, ugm3: None };

    pub fn is_valid(&self) -> bool {
        self.ppm.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutlierRecord {
    pub zscore: Option<f64>,
    pub is_outlier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GasEventRecord {
    pub baseline: Option<f64>,
    pub threshold: Option<f64>,
    pub is_event: bool,
    pub intensity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub is_anomaly: bool,
    /// Isolation score; lower is more anomalous.
    pub score: f64,
}
