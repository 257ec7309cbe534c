//! Per-batch summaries of a processed batch, used for logs and run reports.

use crate::{
    aqi::AqiEngine,
    batch::{ColumnRole, SensorBatch},
    conversion::round_to,
    pipeline::{
        engine::{BatchOutcome, ANOMALY_FLAG_COLUMN},
        state::PipelineEvent,
    },
};
use serde::Serialize;
use std::collections::BTreeMap;

/// The worst AQI reading of one sensor within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiPeak {
    pub aqi: u16,
    pub category: String,
    pub row: usize,
}

/// AQI and concentration statistics of one sensor over its valid rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiStats {
    pub pollutant: String,
    pub aqi_min: u16,
    pub aqi_max: u16,
    /// Rounded to one decimal place.
    pub aqi_mean: f64,
    /// µg/m³, rounded to two decimal places like the mean.
    pub concentration_min: f64,
    pub concentration_max: f64,
    pub concentration_mean: f64,
    /// The most frequent category; ties go to the alphabetically first.
    pub prevailing_category: String,
    pub measurements: usize,
}

impl AqiStats {
    /// Overall rating of the sensor, driven by its highest AQI.
    pub fn rating(&self) -> &'static str {
        match self.aqi_max {
            0..=50 => "Excellent (Good)",
            51..=100 => "Acceptable (Moderate)",
            101..=150 => "Concerning (Unhealthy for Sensitive Groups)",
            _ => "Problematic (Unhealthy or worse)",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub batch: String,
    pub rows: usize,
    pub gas_channels: usize,
    pub environmental_channels: usize,
    /// Z-score outliers per sensor channel.
    pub outliers: BTreeMap<String, usize>,
    /// Gas events per gas channel.
    pub gas_events: BTreeMap<String, usize>,
    pub anomalies: usize,
    pub anomaly_percent: f64,
    pub added_columns: usize,
    pub worst_aqi: BTreeMap<String, AqiPeak>,
    pub aqi_stats: BTreeMap<String, AqiStats>,
    pub pipeline_events: Vec<PipelineEvent>,
}

fn count_flags(outcome: &BatchOutcome, column: &str) -> usize {
    outcome
        .batch
        .numeric(column)
        .map_or(0, |values| values.iter().filter(|v| **v == Some(1.0)).count())
}

impl BatchSummary {
    pub fn from_outcome(outcome: &BatchOutcome, aqi: &AqiEngine) -> Self {
        let batch = &outcome.batch;
        let gas = batch.channels(ColumnRole::Gas);
        let environmental = batch.channels(ColumnRole::Environmental);

        let outliers = batch
            .sensor_channels()
            .into_iter()
            .map(|c| {
                let count = count_flags(outcome, &format!("{}_outlier", c));
                (c, count)
            })
            .collect();
        let gas_events = gas
            .iter()
            .map(|c| (c.clone(), count_flags(outcome, &format!("{}_event", c))))
            .collect();

        let anomalies = count_flags(outcome, ANOMALY_FLAG_COLUMN);
        let anomaly_percent = if batch.rows() > 0 {
            anomalies as f64 / batch.rows() as f64 * 100.0
        } else {
            0.0
        };

        let worst_aqi = gas
            .iter()
            .filter_map(|sensor| worst_aqi(outcome, sensor, aqi).map(|peak| (sensor.clone(), peak)))
            .collect();
        let aqi_stats = gas
            .iter()
            .filter_map(|sensor| {
                let pollutant = aqi.pollutant_for(sensor)?;
                aqi_stats(batch, sensor, pollutant).map(|stats| (sensor.clone(), stats))
            })
            .collect();

        Self {
            batch: batch.name().to_string(),
            rows: batch.rows(),
            gas_channels: gas.len(),
            environmental_channels: environmental.len(),
            outliers,
            gas_events,
            anomalies,
            anomaly_percent,
            added_columns: outcome.added_columns.len(),
            worst_aqi,
            aqi_stats,
            pipeline_events: outcome.events.clone(),
        }
    }

    pub fn total_outliers(&self) -> usize {
        self.outliers.values().sum()
    }

    pub fn total_events(&self) -> usize {
        self.gas_events.values().sum()
    }

    /// The highest AQI reading across all sensors of the batch.
    pub fn overall_worst(&self) -> Option<(&str, &AqiPeak)> {
        self.worst_aqi
            .iter()
            .max_by_key(|(_, peak)| peak.aqi)
            .map(|(sensor, peak)| (sensor.as_str(), peak))
    }
}

/// Finds the row with the most severe category, the highest AQI breaking ties.
fn worst_aqi(outcome: &BatchOutcome, sensor: &str, aqi: &AqiEngine) -> Option<AqiPeak> {
    let values = outcome.batch.numeric(&format!("{}_aqi", sensor))?;
    let categories = outcome.batch.column(&format!("{}_aqi_category", sensor))?;

    values
        .iter()
        .enumerate()
        .filter_map(|(row, value)| {
            let value = (*value)?;
            let category = categories.cell(row);
            let severity = aqi.severity(&category)?;
            Some((severity, value as u16, category, row))
        })
        .max_by_key(|(severity, value, _, _)| (*severity, *value))
        .map(|(_, aqi, category, row)| AqiPeak { aqi, category, row })
}

fn aqi_stats(batch: &SensorBatch, sensor: &str, pollutant: &str) -> Option<AqiStats> {
    let aqi = batch.numeric(&format!("{}_aqi", sensor))?;
    let ugm3 = batch.numeric(&format!("{}_ugm3", sensor))?;
    let categories = batch.column(&format!("{}_aqi_category", sensor))?;

    let valid: Vec<(f64, f64, usize)> = aqi
        .iter()
        .zip(ugm3)
        .enumerate()
        .filter_map(|(row, (a, c))| Some(((*a)?, (*c)?, row)))
        .collect();
    if valid.is_empty() {
        return None;
    }

    let n = valid.len() as f64;
    let (mut aqi_min, mut aqi_max, mut conc_min, mut conc_max) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    let (mut aqi_sum, mut conc_sum) = (0.0, 0.0);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for &(a, c, row) in &valid {
        aqi_min = aqi_min.min(a);
        aqi_max = aqi_max.max(a);
        conc_min = conc_min.min(c);
        conc_max = conc_max.max(c);
        aqi_sum += a;
        conc_sum += c;
        *counts.entry(categories.cell(row)).or_default() += 1;
    }

    let prevailing_category = counts
        .into_iter()
        .fold(None, |best: Option<(String, usize)>, (category, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((category, count)),
        })
        .map(|(category, _)| category)
        .unwrap_or_default();

    Some(AqiStats {
        pollutant: pollutant.to_string(),
        aqi_min: aqi_min as u16,
        aqi_max: aqi_max as u16,
        aqi_mean: round_to(aqi_sum / n, 1),
        concentration_min: round_to(conc_min, 2),
        concentration_max: round_to(conc_max, 2),
        concentration_mean: round_to(conc_sum / n, 2),
        prevailing_category,
        measurements: valid.len(),
    })
}
