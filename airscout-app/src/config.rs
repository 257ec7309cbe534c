use airscout_core::{
    aqi::{self, AqiEngine},
    calibration::{self, CalibrationStore},
    AirScoutError, PipelineConfig,
};
use airscout_schemas::{
    aqi::{AqiBreakpointTable, SensorPollutant},
    file_formats::{AnalysisFile, AqiFile, CalibrationFile},
    settings::AnalysisSettings,
};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, fs, path::Path};
use tracing::{debug, info};

pub const CALIBRATION_FILE: &str = "calibration.yaml";
pub const AQI_FILE: &str = "aqi.yaml";
pub const ANALYSIS_FILE: &str = "analysis.yaml";

/// Command line overrides of the analysis settings.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AnalysisOverrides {
    /// EMA smoothing span
    #[arg(long)]
    pub ema_span: Option<u32>,
    /// |z| above which a sample is an outlier
    #[arg(long)]
    pub zscore_threshold: Option<f64>,
    /// Rolling baseline window of the gas-event detector, in rows
    #[arg(long)]
    pub event_window: Option<usize>,
    /// Baseline multiplier above which a gas sample is an event
    #[arg(long)]
    pub event_multiplier: Option<f64>,
    /// Expected fraction of anomalous rows
    #[arg(long)]
    pub contamination: Option<f64>,
    /// Number of isolation trees
    #[arg(long)]
    pub estimators: Option<usize>,
    /// Seed of the anomaly model
    #[arg(long)]
    pub seed: Option<u64>,
}

impl AnalysisOverrides {
    pub fn apply(&self, settings: &mut AnalysisSettings) {
        if let Some(span) = self.ema_span {
            settings.smoothing.span = span;
        }
        if let Some(threshold) = self.zscore_threshold {
            settings.outliers.zscore_threshold = threshold;
        }
        if let Some(window) = self.event_window {
            settings.events.window = window;
        }
        if let Some(multiplier) = self.event_multiplier {
            settings.events.multiplier = multiplier;
        }
        if let Some(contamination) = self.contamination {
            settings.anomaly.contamination = contamination;
        }
        if let Some(estimators) = self.estimators {
            settings.anomaly.estimators = estimators;
        }
        if let Some(seed) = self.seed {
            settings.anomaly.seed = seed;
        }
    }
}

/// Loads the pipeline configuration from a directory of YAML files.
///
/// Every file is optional. Calibration profiles and sensor mappings from the
/// files are merged over the built-in ones by id, breakpoint tables by
/// pollutant, and a non-empty category list replaces the built-in table.
pub fn load_config(dir: &Path, overrides: &AnalysisOverrides) -> Result<PipelineConfig> {
    info!(dir = %dir.display(), "loading configuration");

    let calibration = match load_yaml_file::<CalibrationFile>(&dir.join(CALIBRATION_FILE))? {
        Some(file) => CalibrationStore::new(calibration::default_profiles())?
            .merged_with(file.sensors)
            .with_context(|| format!("Invalid calibration in {:?}", dir.join(CALIBRATION_FILE)))?,
        None => CalibrationStore::new(calibration::default_profiles())?,
    };

    let aqi = match load_yaml_file::<AqiFile>(&dir.join(AQI_FILE))? {
        Some(file) => build_aqi_engine(file)
            .with_context(|| format!("Invalid AQI tables in {:?}", dir.join(AQI_FILE)))?,
        None => AqiEngine::default(),
    };

    let mut settings = load_yaml_file::<AnalysisFile>(&dir.join(ANALYSIS_FILE))?
        .map(|file| file.settings)
        .unwrap_or_default();
    overrides.apply(&mut settings);

    let config = PipelineConfig::new(calibration, aqi, settings).context("Invalid analysis settings")?;
    info!(
        sensors = config.calibration.len(),
        categories = config.aqi.categories().len(),
        "configuration loaded"
    );
    Ok(config)
}

fn build_aqi_engine(file: AqiFile) -> Result<AqiEngine, AirScoutError> {
    let tables = merge_by_key(aqi::default_breakpoint_tables(), file.breakpoints, |t: &AqiBreakpointTable| {
        t.pollutant.clone()
    });
    let mapping = merge_by_key(aqi::default_sensor_pollutants(), file.sensor_pollutants, |m: &SensorPollutant| {
        m.sensor_id.clone()
    });
    let categories = if file.categories.is_empty() {
        aqi::default_categories()
    } else {
        file.categories
    };
    AqiEngine::new(tables, categories, mapping)
}

fn merge_by_key<T, K>(defaults: Vec<T>, overrides: Vec<T>, key: K) -> Vec<T>
where
    K: Fn(&T) -> String,
{
    let mut map = BTreeMap::new();
    for item in defaults.into_iter().chain(overrides) {
        map.insert(key(&item), item);
    }
    map.into_values().collect()
}

/// Reads and parses one YAML file; a missing file yields `None`.
fn load_yaml_file<F: DeserializeOwned>(path: &Path) -> Result<Option<F>, AirScoutError> {
    if !path.is_file() {
        debug!(file = %path.display(), "not present, using defaults");
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).map_err(|e| AirScoutError::FileIO(path.display().to_string(), e))?;
    let parsed =
        serde_yaml::from_str(&content).map_err(|e| AirScoutError::YamlParsing(path.display().to_string(), e))?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_touch_given_values() {
        let mut settings = AnalysisSettings::default();
        let overrides = AnalysisOverrides {
            ema_span: Some(9),
            seed: Some(7),
            ..Default::default()
        };
        overrides.apply(&mut settings);
        assert_eq!(settings.smoothing.span, 9);
        assert_eq!(settings.anomaly.seed, 7);
        assert_eq!(settings.events.window, 20);
    }

    #[test]
    fn merge_replaces_by_key() {
        let merged = merge_by_key(vec![("a", 1), ("b", 2)], vec![("b", 3)], |(k, _)| k.to_string());
        assert_eq!(merged, vec![("a", 1), ("b", 3)]);
    }
}
