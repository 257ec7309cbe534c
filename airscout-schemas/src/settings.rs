//! Tunable parameters of the analysis pipeline.
//!
//! Every struct deserializes with `#[serde(default)]`, so a configuration file
//! only has to name the values it wants to change.

use serde::{Deserialize, Serialize};

/// Guard bands and constants of the signal -> ppm -> µg/m³ conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionLimits {
    /// Ratios `Rs/R0` at or below this value are rejected.
    pub min_valid_ratio: f64,
    /// Ratios `Rs/R0` above this value are rejected.
    pub max_valid_ratio: f64,
    pub max_realistic_ppm: f64,
    pub max_realistic_ugm3: f64,
    /// Molar volume of an ideal gas at 25 °C and 1 atm, in L/mol.
    pub molar_volume_stp: f64,
    pub ppm_to_ugm3_factor: f64,
    pub decimal_places: u32,
}

impl Default for ConversionLimits {
    fn default() -> Self {
        Self {
            min_valid_ratio: 0.0,
            max_valid_ratio: 10.0,
            max_realistic_ppm: 1000.0,
            max_realistic_ugm3: 10000.0,
            molar_volume_stp: 24.45,
            ppm_to_ugm3_factor: 1000.0,
            decimal_places: 2,
        }
    }
}

/// How the columns of an input batch are classified into sensor channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Gas channels are named `<prefix><digits>`, e.g. `MQ135`.
    pub gas_sensor_prefix: String,
    /// Case-insensitive substrings marking an environmental channel.
    pub environmental_keywords: Vec<String>,
    pub timestamp_column: String,
    /// Name suffixes of columns that already hold a derived statistic or
    /// flag. Such input columns are never smoothed, scored or rounded.
    pub excluded_suffixes: Vec<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            gas_sensor_prefix: "MQ".to_string(),
            environmental_keywords: ["temperature", "humidity", "light", "pressure", "altitude"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            timestamp_column: "DateTime".to_string(),
            excluded_suffixes: ["_zscore", "_outlier", "_event", "_intensity", "_anomaly", "_score"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    /// EMA span; the smoothing weight is `2 / (span + 1)`.
    pub span: u32,
    /// Channels that are never smoothed or rounded on output.
    pub excluded_channels: Vec<String>,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            span: 5,
            excluded_channels: [
                "GPS_Lat",
                "GPS_Lon",
                "GPS_Alt",
                "GPS_Speed",
                "GPS_Course",
                "GPS_Sats",
                "Radiation_CPS",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierSettings {
    pub zscore_threshold: f64,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        Self { zscore_threshold: 2.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Width of the centered rolling window, in rows.
    pub window: usize,
    pub multiplier: f64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            window: 20,
            multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    /// Expected fraction of anomalous rows, in `(0, 0.5]`.
    pub contamination: f64,
    /// Number of trees in the isolation ensemble.
    pub estimators: usize,
    pub seed: u64,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            estimators: 100,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Decimal places for non-derived numeric columns; `None` disables rounding.
    pub decimal_places: Option<u32>,
    pub file_suffix: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            decimal_places: Some(3),
            file_suffix: "_ema".to_string(),
        }
    }
}

/// All analysis parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub conversion: ConversionLimits,
    pub channels: ChannelSettings,
    pub smoothing: SmoothingSettings,
    pub outliers: OutlierSettings,
    pub events: EventSettings,
    pub anomaly: AnomalySettings,
    pub output: OutputSettings,
}
