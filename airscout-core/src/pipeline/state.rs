use serde::{Deserialize, Serialize};

/// Smoothing memory of one channel. Lives for a single batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesState {
    pub ema: Option<f64>,
}

impl SeriesState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample and returns the smoothed output for its row.
    ///
    /// The first valid sample seeds the state. A missing sample repeats the
    /// previous output without touching the state.
    pub fn update(&mut self, value: Option<f64>, alpha: f64) -> Option<f64> {
        match (value, self.ema) {
            (Some(v), None) if v.is_finite() => self.ema = Some(v),
            (Some(v), Some(prev)) if v.is_finite() => self.ema = Some(prev + alpha * (v - prev)),
            _ => {}
        }
        self.ema
    }
}

/// Something noteworthy that happened while a batch was processed. None of
/// these abort the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    CalibrationMissing { sensor: String },
    DegenerateChannel { channel: String, stage: String, reason: String },
    ModelUnavailable { reason: String },
}
