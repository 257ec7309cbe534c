//! Batch analysis pipeline: concentration conversion followed by the
//! smoothing, outlier, gas-event and anomaly stages.

pub mod anomaly;
pub mod builder;
pub mod engine;
pub mod events;
pub mod isolation_forest;
pub mod outliers;
pub mod smoothing;
pub mod state;

pub use builder::PipelineBuilder;
pub use engine::{BatchOutcome, PipelineEngine};
