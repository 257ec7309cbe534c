use thiserror::Error;

#[derive(Debug, Error)]
pub enum AirScoutError {
    #[error("Invalid input for sensor '{0}': {1}")]
    InvalidInput(String, String),

    #[error("No calibration profile configured for sensor '{0}'")]
    ConfigurationMissing(String),

    #[error("Degenerate batch for '{0}': {1}")]
    DegenerateBatch(String, String),

    #[error("Anomaly model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    #[error("Batch '{0}' contains no rows")]
    EmptyBatch(String),

    #[error("Column '{0}' has {1} rows but the batch has {2}")]
    ColumnLengthMismatch(String, usize, usize),

    #[error("Column '{0}' not found in batch")]
    ColumnNotFound(String),

    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),

    #[error("Failed to parse YAML from '{0}': {1}")]
    YamlParsing(String, #[source] serde_yaml::Error),

    #[error("Failed to serialize JSON: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Failed to process CSV file '{0}': {1}")]
    CsvError(String, #[source] csv::Error),
}
