//! CSV input and output of sensor batches.

use crate::{
    analysis::BatchSummary,
    batch::{ColumnRole, ColumnValues, SensorBatch},
    conversion::round_to,
    error::AirScoutError,
};
use airscout_schemas::settings::{ChannelSettings, OutputSettings};
use csv::{ReaderBuilder, Trim, Writer};
use std::{fs, path::Path};
use tracing::debug;

fn batch_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads a CSV file with a header row into a batch. Lines starting with `#`
/// are ignored; short rows are padded with empty cells.
pub fn read_batch(path: &Path, settings: &ChannelSettings) -> Result<SensorBatch, AirScoutError> {
    let display = path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AirScoutError::CsvError(display.clone(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AirScoutError::CsvError(display.clone(), e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| AirScoutError::CsvError(display.clone(), e))?;
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(record.get(i).unwrap_or_default().to_string());
        }
    }

    let columns = headers.into_iter().zip(cells).collect();
    let batch = SensorBatch::from_columns(&batch_name(path), columns, settings)?;
    let file = &display;
    debug!(file = %file, rows = batch.rows(), columns = batch.columns().len(), "batch read");
    Ok(batch)
}

/// Writes processed batches as CSV.
pub struct BatchWriter {
    path: String,
    writer: Writer<fs::File>,
}

impl BatchWriter {
    pub fn new(path: &Path) -> Result<Self, AirScoutError> {
        let display = path.display().to_string();
        let writer = Writer::from_path(path).map_err(|e| AirScoutError::CsvError(display.clone(), e))?;
        Ok(Self { path: display, writer })
    }

    /// Writes the header and every row of `batch`.
    ///
    /// Numeric columns are rounded to `output.decimal_places`, except score
    /// columns and the channels in `unrounded`, which keep full precision.
    pub fn write_batch(
        &mut self,
        batch: &SensorBatch,
        output: &OutputSettings,
        unrounded: &[String],
    ) -> Result<(), AirScoutError> {
        let columns: Vec<_> = batch
            .columns()
            .iter()
            .map(|column| {
                let round = output
                    .decimal_places
                    .filter(|_| column.role != ColumnRole::Score && !unrounded.contains(&column.name));
                match (round, column.as_numeric()) {
                    (Some(places), Some(values)) => {
                        let rounded = values.iter().map(|v| v.map(|v| round_to(v, places))).collect();
                        let mut column = column.clone();
                        column.values = ColumnValues::Numeric(rounded);
                        column
                    }
                    _ => column.clone(),
                }
            })
            .collect();

        let csv_err = |e| AirScoutError::CsvError(self.path.clone(), e);
        self.writer
            .write_record(columns.iter().map(|c| c.name.as_str()))
            .map_err(csv_err)?;
        for row in 0..batch.rows() {
            self.writer
                .write_record(columns.iter().map(|c| c.cell(row)))
                .map_err(csv_err)?;
        }
        self.writer
            .flush()
            .map_err(|e| AirScoutError::FileIO(self.path.clone(), e))?;
        Ok(())
    }
}

/// Writes a batch summary next to the output CSV as pretty-printed JSON.
pub fn write_summary_json(path: &Path, summary: &BatchSummary) -> Result<(), AirScoutError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).map_err(|e| AirScoutError::FileIO(path.display().to_string(), e))
}
