use super::{
    anomaly::{fallback_records, try_score_anomalies, AnomalyParams, OutlierModel},
    events::detect_events,
    outliers::{mark_outliers, BatchStatistics},
    smoothing::smooth_batch,
    state::PipelineEvent,
};
use crate::{
    batch::{Column, ColumnRole, SensorBatch},
    config::PipelineConfig,
    conversion::ConcentrationConverter,
    error::AirScoutError,
};
use airscout_schemas::aqi::AqiResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANOMALY_FLAG_COLUMN: &str = "ml_anomaly";
pub const ANOMALY_SCORE_COLUMN: &str = "ml_anomaly_score";

/// Runs the full analysis over one batch at a time.
///
/// The engine holds no per-batch state, so a single engine can process
/// several batches concurrently.
pub struct PipelineEngine {
    pub(super) config: Arc<PipelineConfig>,
    pub(super) converter: ConcentrationConverter,
    pub(super) model: Box<dyn OutlierModel>,
}

/// A processed batch together with what happened while processing it.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch: SensorBatch,
    /// Columns added by the pipeline, in the order they were added.
    pub added_columns: Vec<String>,
    pub events: Vec<PipelineEvent>,
}

impl BatchOutcome {
    /// Names of the channels a given stage flagged as degenerate.
    pub fn degenerate_channels(&self, stage: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::DegenerateChannel { channel, stage: s, .. } if s == stage => Some(channel.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Collects the columns and events produced by the stages of one batch.
struct StageOutput<'a> {
    batch: &'a mut SensorBatch,
    added: Vec<String>,
    events: Vec<PipelineEvent>,
}

impl StageOutput<'_> {
    fn add(&mut self, column: Column) -> Result<(), AirScoutError> {
        let name = column.name.clone();
        self.batch.push(column)?;
        if !self.added.contains(&name) {
            self.added.push(name);
        }
        Ok(())
    }

    fn degenerate(&mut self, channel: &str, stage: &str, reason: String) {
        let error = AirScoutError::DegenerateBatch(channel.to_string(), reason.clone());
        warn!(batch = self.batch.name(), stage, "{}", error);
        self.events.push(PipelineEvent::DegenerateChannel {
            channel: channel.to_string(),
            stage: stage.to_string(),
            reason,
        });
    }
}

impl PipelineEngine {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn shared_config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Processes one batch through every stage.
    ///
    /// Numeric problems never abort the batch; they degrade to missing
    /// values or empty flags and are reported in [`BatchOutcome::events`].
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatch` for a batch without rows. Other errors indicate
    /// an internal column bookkeeping failure.
    pub fn process(&self, mut batch: SensorBatch) -> Result<BatchOutcome, AirScoutError> {
        if batch.rows() == 0 {
            return Err(AirScoutError::EmptyBatch(batch.name().to_string()));
        }

        let mut out = StageOutput {
            batch: &mut batch,
            added: Vec::new(),
            events: Vec::new(),
        };

        // Conversion works on the raw signal, before any smoothing.
        self.convert_concentrations(&mut out)?;

        let smoothed = smooth_batch(out.batch, &self.config.settings.smoothing)?;
        debug!(batch = out.batch.name(), channels = ?smoothed, "smoothing done");

        self.mark_outliers(&mut out)?;
        self.detect_gas_events(&mut out)?;
        self.score_anomalies(&mut out)?;

        let StageOutput { added, events, .. } = out;
        info!(
            batch = batch.name(),
            rows = batch.rows(),
            added_columns = added.len(),
            events = events.len(),
            "batch processed"
        );

        Ok(BatchOutcome {
            batch,
            added_columns: added,
            events,
        })
    }

    fn convert_concentrations(&self, out: &mut StageOutput<'_>) -> Result<(), AirScoutError> {
        let rows = out.batch.rows();

        for sensor in out.batch.channels(ColumnRole::Gas) {
            let results = match self.config.calibration.require(&sensor) {
                Ok(profile) => {
                    let raw = out.batch.numeric(&sensor).unwrap_or_default();
                    let results = self.converter.convert_series(raw, profile);

                    let readings = raw.iter().filter(|v| v.is_some()).count();
                    let converted = results.iter().filter(|r| r.ppm.is_some()).count();
                    if readings > 0 && converted == 0 {
                        let error = AirScoutError::InvalidInput(
                            sensor.clone(),
                            format!("none of {} readings is in the valid range", readings),
                        );
                        warn!(batch = out.batch.name(), "{}", error);
                    }
                    results
                }
                Err(error) => {
                    warn!(batch = out.batch.name(), "{}", error);
                    out.events.push(PipelineEvent::CalibrationMissing {
                        sensor: sensor.clone(),
                    });
                    vec![Default::default(); rows]
                }
            };

            let ppm: Vec<Option<f64>> = results.iter().map(|r| r.ppm).collect();
            let ugm3: Vec<Option<f64>> = results.iter().map(|r| r.ugm3).collect();

            if self.config.aqi.pollutant_for(&sensor).is_some() {
                let (aqi, categories): (Vec<Option<f64>>, Vec<String>) = ugm3
                    .iter()
                    .map(|c| {
                        let result = c
                            .and_then(|c| self.config.aqi.compute_for_sensor(&sensor, c))
                            .unwrap_or_else(AqiResult::unknown);
                        if result.is_unknown() {
                            (None, result.category)
                        } else {
                            (Some(f64::from(result.aqi)), result.category)
                        }
                    })
                    .unzip();

                out.add(Column::numeric(&format!("{}_ppm", sensor), ColumnRole::Derived, ppm))?;
                out.add(Column::numeric(&format!("{}_ugm3", sensor), ColumnRole::Derived, ugm3))?;
                out.add(Column::numeric(&format!("{}_aqi", sensor), ColumnRole::Derived, aqi))?;
                out.add(Column::text(&format!("{}_aqi_category", sensor), ColumnRole::Derived, categories))?;
            } else {
                out.add(Column::numeric(&format!("{}_ppm", sensor), ColumnRole::Derived, ppm))?;
                out.add(Column::numeric(&format!("{}_ugm3", sensor), ColumnRole::Derived, ugm3))?;
            }
        }
        Ok(())
    }

    fn mark_outliers(&self, out: &mut StageOutput<'_>) -> Result<(), AirScoutError> {
        let threshold = self.config.settings.outliers.zscore_threshold;

        for channel in out.batch.sensor_channels() {
            let (records, degenerate) = match out.batch.numeric(&channel) {
                Some(series) => {
                    let degenerate = match BatchStatistics::compute(series) {
                        None => Some("fewer than two valid values".to_string()),
                        Some(stats) if stats.is_degenerate() => Some("zero variance".to_string()),
                        Some(_) => None,
                    };
                    (mark_outliers(series, threshold), degenerate)
                }
                None => continue,
            };
            if let Some(reason) = degenerate {
                out.degenerate(&channel, "outliers", reason);
            }

            let flags: Vec<bool> = records.iter().map(|r| r.is_outlier).collect();
            let zscores = records.iter().map(|r| r.zscore).collect();
            out.add(Column::numeric(&format!("{}_zscore", channel), ColumnRole::Score, zscores))?;
            out.add(Column::flags(&format!("{}_outlier", channel), &flags))?;
        }
        Ok(())
    }

    fn detect_gas_events(&self, out: &mut StageOutput<'_>) -> Result<(), AirScoutError> {
        let settings = &self.config.settings.events;

        for channel in out.batch.channels(ColumnRole::Gas) {
            let records = match out.batch.numeric(&channel) {
                Some(series) => detect_events(series, settings.window, settings.multiplier),
                None => continue,
            };
            if records.iter().all(|r| r.baseline.is_none()) {
                let reason = if out.batch.rows() < settings.window {
                    format!("batch has fewer rows than the event window ({})", settings.window)
                } else {
                    "no complete baseline window".to_string()
                };
                out.degenerate(&channel, "events", reason);
            }

            let flags: Vec<bool> = records.iter().map(|r| r.is_event).collect();
            let intensity = records.iter().map(|r| r.intensity).collect();
            out.add(Column::flags(&format!("{}_event", channel), &flags))?;
            out.add(Column::numeric(&format!("{}_intensity", channel), ColumnRole::Score, intensity))?;
        }
        Ok(())
    }

    fn score_anomalies(&self, out: &mut StageOutput<'_>) -> Result<(), AirScoutError> {
        let params = AnomalyParams::from(&self.config.settings.anomaly);
        let channels = out.batch.sensor_channels();
        let series: Vec<&[Option<f64>]> = channels
            .iter()
            .filter_map(|name| out.batch.numeric(name))
            .collect();

        let records = match try_score_anomalies(&series, &params, self.model.as_ref()) {
            Ok(records) => records,
            Err(error) => {
                warn!(batch = out.batch.name(), "{}", error);
                out.events.push(PipelineEvent::ModelUnavailable {
                    reason: error.to_string(),
                });
                fallback_records(out.batch.rows())
            }
        };

        let flags: Vec<bool> = records.iter().map(|r| r.is_anomaly).collect();
        let scores = records.iter().map(|r| Some(r.score)).collect();
        out.add(Column::flags(ANOMALY_FLAG_COLUMN, &flags))?;
        out.add(Column::numeric(ANOMALY_SCORE_COLUMN, ColumnRole::Score, scores))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        anomaly::ModelOutput,
        builder::PipelineBuilder,
    };
    use approx::assert_relative_eq;
    use ndarray::Array2;

    struct Unavailable;

    impl OutlierModel for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn fit_predict(&self, _: &Array2<f64>, _: &AnomalyParams) -> anyhow::Result<ModelOutput> {
            anyhow::bail!("backend not installed")
        }
    }

    fn batch(rows: usize) -> SensorBatch {
        let mut batch = SensorBatch::new("unit", rows);
        let mq135 = (0..rows).map(|i| Some(3300.0 + (i % 7) as f64 * 10.0)).collect();
        let temperature = (0..rows).map(|i| Some(21.0 + (i % 5) as f64 * 0.1)).collect();
        batch.push(Column::numeric("MQ135", ColumnRole::Gas, mq135)).unwrap();
        batch.push(Column::numeric("MQ4", ColumnRole::Gas, vec![Some(1500.0); rows])).unwrap();
        batch
            .push(Column::numeric("Temperature", ColumnRole::Environmental, temperature))
            .unwrap();
        batch
    }

    #[test]
    fn adds_every_derived_column() {
        let engine = PipelineBuilder::new().build().unwrap();
        let outcome = engine.process(batch(40)).unwrap();
        let names = outcome.batch.column_names();
        for expected in [
            "MQ135_ppm",
            "MQ135_ugm3",
            "MQ135_aqi",
            "MQ135_aqi_category",
            "MQ135_zscore",
            "MQ135_outlier",
            "MQ135_event",
            "MQ135_intensity",
            "MQ4_ppm",
            "Temperature_zscore",
            "Temperature_outlier",
            "ml_anomaly",
            "ml_anomaly_score",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        // MQ4 has no pollutant mapping; temperature is not a gas channel.
        assert!(!names.contains(&"MQ4_aqi"));
        assert!(!names.contains(&"Temperature_event"));
        assert!(outcome.batch.columns().iter().all(|c| c.values.len() == 40));
    }

    #[test]
    fn converts_raw_values_before_smoothing() {
        let engine = PipelineBuilder::new().build().unwrap();
        let outcome = engine.process(batch(40)).unwrap();
        let ppm = outcome.batch.numeric("MQ135_ppm").unwrap();
        let ugm3 = outcome.batch.numeric("MQ135_ugm3").unwrap();
        assert_relative_eq!(ppm[0].unwrap(), 0.11);
        assert_relative_eq!(ugm3[0].unwrap(), 206.95);
        assert_relative_eq!(outcome.batch.numeric("MQ135_aqi").unwrap()[0].unwrap(), 155.0);
        assert_eq!(outcome.batch.column("MQ135_aqi_category").unwrap().cell(0), "Unhealthy");
    }

    #[test]
    fn constant_channel_is_reported_degenerate() {
        let engine = PipelineBuilder::new().build().unwrap();
        let outcome = engine.process(batch(40)).unwrap();
        assert_eq!(outcome.degenerate_channels("outliers"), vec!["MQ4"]);
        let zscores = outcome.batch.numeric("MQ4_zscore").unwrap();
        assert!(zscores.iter().all(|z| *z == Some(0.0)));
    }

    #[test]
    fn short_batch_has_no_event_baseline() {
        let engine = PipelineBuilder::new().build().unwrap();
        let outcome = engine.process(batch(10)).unwrap();
        assert_eq!(outcome.degenerate_channels("events"), vec!["MQ135", "MQ4"]);
        let intensity = outcome.batch.numeric("MQ135_intensity").unwrap();
        assert!(intensity.iter().all(Option::is_none));
    }

    #[test]
    fn missing_calibration_yields_empty_columns() {
        let engine = PipelineBuilder::new().build().unwrap();
        let mut input = batch(30);
        input
            .push(Column::numeric("MQ99", ColumnRole::Gas, vec![Some(100.0); 30]))
            .unwrap();
        let outcome = engine.process(input).unwrap();
        assert!(outcome
            .events
            .contains(&PipelineEvent::CalibrationMissing { sensor: "MQ99".to_string() }));
        assert!(outcome.batch.numeric("MQ99_ppm").unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn unavailable_model_degrades_to_no_anomalies() {
        let engine = PipelineBuilder::new()
            .with_outlier_model(Box::new(Unavailable))
            .build()
            .unwrap();
        let outcome = engine.process(batch(30)).unwrap();
        assert!(matches!(outcome.events.last(), Some(PipelineEvent::ModelUnavailable { .. })));
        let flags = outcome.batch.numeric(ANOMALY_FLAG_COLUMN).unwrap();
        let scores = outcome.batch.numeric(ANOMALY_SCORE_COLUMN).unwrap();
        assert!(flags.iter().all(|f| *f == Some(0.0)));
        assert!(scores.iter().all(|s| *s == Some(0.0)));
    }

    #[test]
    fn empty_batch_is_an_error() {
        let engine = PipelineBuilder::new().build().unwrap();
        let result = engine.process(SensorBatch::new("empty", 0));
        assert!(matches!(result, Err(AirScoutError::EmptyBatch(_))));
    }
}
