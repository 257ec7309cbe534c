use super::{anomaly::OutlierModel, engine::PipelineEngine, isolation_forest::IsolationForest};
use crate::{config::PipelineConfig, conversion::ConcentrationConverter, error::AirScoutError};
use airscout_schemas::settings::AnalysisSettings;
use std::sync::Arc;

/// A fluent builder for constructing a `PipelineEngine`.
///
/// Everything is optional: without a configuration the built-in calibration
/// set, AQI tables and default analysis settings are used, and without a
/// model the built-in isolation forest scores anomalies.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<Arc<PipelineConfig>>,
    settings: Option<AnalysisSettings>,
    model: Option<Box<dyn OutlierModel>>,
}

impl PipelineBuilder {
    /// Creates a new, empty `PipelineBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the calibration store, AQI tables and analysis settings.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Shares an already built configuration between several engines.
    pub fn with_shared_config(mut self, config: Arc<PipelineConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the analysis settings of the configuration.
    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Plugs in a different multivariate outlier model.
    pub fn with_outlier_model(mut self, model: Box<dyn OutlierModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Consumes the builder and returns a ready `PipelineEngine`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the analysis settings are out of range.
    pub fn build(self) -> Result<PipelineEngine, AirScoutError> {
        let config = self.config.unwrap_or_default();
        let config = match self.settings {
            Some(settings) => Arc::new(config.with_settings(settings)?),
            None => {
                crate::config::validate_settings(&config.settings)?;
                config
            }
        };

        let converter = ConcentrationConverter::new(config.settings.conversion.clone());
        let model = self
            .model
            .unwrap_or_else(|| Box::new(IsolationForest::default()));

        Ok(PipelineEngine {
            config,
            converter,
            model,
        })
    }
}
