//! Calibration, AQI and anomaly detection for gas sensor time series.
//!
//! A [`pipeline::PipelineEngine`] turns a [`batch::SensorBatch`] of raw
//! readings into concentrations, AQI values and outlier / event / anomaly
//! flags. The [`logger`] module reads and writes batches as CSV.

pub mod analysis;
pub mod aqi;
pub mod batch;
pub mod calibration;
pub mod config;
pub mod conversion;
pub mod error;
pub mod logger;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::AirScoutError;
