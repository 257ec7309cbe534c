//! Multivariate anomaly scoring across all sensor channels of a batch.
//!
//! Channels are mean-imputed and standardized jointly, then handed to an
//! [`OutlierModel`]. The model is a seam: any isolation-style scorer that
//! honours the contamination / ensemble size / seed semantics can be plugged
//! in through the pipeline builder.

use super::isolation_forest::IsolationForest;
use crate::error::AirScoutError;
use airscout_schemas::{reading::AnomalyRecord, settings::AnomalySettings};
use ndarray::Array2;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyParams {
    /// Expected fraction of anomalous rows.
    pub contamination: f64,
    /// Ensemble size.
    pub estimators: usize,
    pub seed: u64,
}

impl From<&AnomalySettings> for AnomalyParams {
    fn from(settings: &AnomalySettings) -> Self {
        Self {
            contamination: settings.contamination,
            estimators: settings.estimators,
            seed: settings.seed,
        }
    }
}

/// Per-row labels (`true` = anomaly) and scores (lower = more anomalous).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub labels: Vec<bool>,
    pub scores: Vec<f64>,
}

pub trait OutlierModel: Send + Sync {
    fn name(&self) -> &str;

    fn fit_predict(&self, matrix: &Array2<f64>, params: &AnomalyParams) -> anyhow::Result<ModelOutput>;
}

/// Builds the standardized `rows x channels` matrix.
///
/// Channels without a single valid value are dropped. Missing values are
/// replaced by the channel mean, then each channel is centered and scaled
/// to unit (population) variance. A constant channel is only centered.
/// Returns `None` when no usable channel remains.
pub fn standardize(channels: &[&[Option<f64>]]) -> Option<Array2<f64>> {
    let rows = channels.first().map_or(0, |c| c.len());
    let usable: Vec<&[Option<f64>]> = channels
        .iter()
        .copied()
        .filter(|c| c.len() == rows && c.iter().any(|v| v.map_or(false, f64::is_finite)))
        .collect();
    if rows == 0 || usable.is_empty() {
        return None;
    }

    let mut matrix = Array2::<f64>::zeros((rows, usable.len()));
    for (j, channel) in usable.iter().enumerate() {
        let valid: Vec<f64> = channel.iter().filter_map(|v| *v).filter(|v| v.is_finite()).collect();
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;

        let imputed: Vec<f64> = channel
            .iter()
            .map(|v| v.filter(|v| v.is_finite()).unwrap_or(mean))
            .collect();
        let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rows as f64;
        let scale = if variance.is_finite() && variance > 0.0 { variance.sqrt() } else { 1.0 };

        for (i, v) in imputed.into_iter().enumerate() {
            matrix[[i, j]] = (v - mean) / scale;
        }
    }
    Some(matrix)
}

/// Scores a batch, reporting why it could not be scored.
pub fn try_score_anomalies(
    channels: &[&[Option<f64>]],
    params: &AnomalyParams,
    model: &dyn OutlierModel,
) -> Result<Vec<AnomalyRecord>, AirScoutError> {
    let matrix = standardize(channels)
        .ok_or_else(|| AirScoutError::ModelUnavailable("no usable sensor channels".to_string()))?;

    let output = model
        .fit_predict(&matrix, params)
        .map_err(|e| AirScoutError::ModelUnavailable(format!("{}: {:#}", model.name(), e)))?;

    if output.labels.len() != matrix.nrows() || output.scores.len() != matrix.nrows() {
        return Err(AirScoutError::ModelUnavailable(format!(
            "{} returned {} labels for {} rows",
            model.name(),
            output.labels.len(),
            matrix.nrows()
        )));
    }

    Ok(output
        .labels
        .into_iter()
        .zip(output.scores)
        .map(|(is_anomaly, score)| AnomalyRecord { is_anomaly, score })
        .collect())
}

/// The all-clear result used when the model cannot run.
pub fn fallback_records(rows: usize) -> Vec<AnomalyRecord> {
    vec![AnomalyRecord::default(); rows]
}

/// Scores a batch with the given model; never fails. When the model cannot
/// be fit, every row is reported as normal with a score of zero.
pub fn score_with_model(
    channels: &[&[Option<f64>]],
    params: &AnomalyParams,
    model: &dyn OutlierModel,
) -> Vec<AnomalyRecord> {
    let rows = channels.first().map_or(0, |c| c.len());
    match try_score_anomalies(channels, params, model) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "anomaly scoring skipped");
            fallback_records(rows)
        }
    }
}

/// Scores a batch with the built-in isolation forest.
pub fn score_anomalies(
    channels: &[&[Option<f64>]],
    contamination: f64,
    estimators: usize,
    seed: u64,
) -> Vec<AnomalyRecord> {
    let params = AnomalyParams {
        contamination,
        estimators,
        seed,
    };
    score_with_model(channels, &params, &IsolationForest::default())
}
