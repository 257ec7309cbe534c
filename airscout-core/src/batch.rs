//! In-memory tabular batch: one row per timestamp, one column per channel.
//!
//! Columns are stored column-major because every analysis stage works on a
//! whole channel at a time. Each column carries a role, decided once from its
//! header when the batch is built, so that stages select their inputs by role.

use crate::error::AirScoutError;
use airscout_schemas::settings::ChannelSettings;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Timestamp,
    /// A combustible / target gas sensor (e.g. `MQ135`).
    Gas,
    /// A generic environmental sensor (temperature, humidity, ...).
    Environmental,
    /// A concentration / AQI column added by the conversion stage.
    Derived,
    /// A statistic or flag, added by the anomaly stages or read from an
    /// input column with a derived suffix. Never smoothed or rounded.
    Score,
    /// Any other column; carried through untouched.
    Passthrough,
}

impl ColumnRole {
    pub fn is_sensor(self) -> bool {
        matches!(self, ColumnRole::Gas | ColumnRole::Environmental)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses raw cells, producing a numeric column when every non-empty
    /// cell is a number and a text column otherwise.
    pub fn from_cells(cells: Vec<String>) -> Self {
        let parsed: Option<Vec<Option<f64>>> = cells.iter().map(|cell| parse_cell(cell)).collect();

        match parsed {
            Some(values) if values.iter().any(Option::is_some) => ColumnValues::Numeric(values),
            _ => ColumnValues::Text(cells),
        }
    }
}

/// `Some(None)` for an empty or `nan` cell, `None` when the cell is not a
/// number.
fn parse_cell(cell: &str) -> Option<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        Some(None)
    } else {
        cell.parse::<f64>().ok().map(Some)
    }
}

/// Parses every cell as a number; unparsable cells become missing values.
/// Returns the values and the number of rejected cells.
fn parse_lenient(cells: &[String]) -> (Vec<Option<f64>>, usize) {
    let mut rejected = 0;
    let values = cells
        .iter()
        .map(|cell| {
            parse_cell(cell).unwrap_or_else(|| {
                rejected += 1;
                None
            })
        })
        .collect();
    (values, rejected)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub role: ColumnRole,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: &str, role: ColumnRole, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.to_string(),
            role,
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: &str, role: ColumnRole, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            role,
            values: ColumnValues::Text(values),
        }
    }

    /// A 0/1 flag column.
    pub fn flags(name: &str, flags: &[bool]) -> Self {
        let values = flags
            .iter()
            .map(|&flag| Some(if flag { 1.0 } else { 0.0 }))
            .collect();
        Self::numeric(name, ColumnRole::Score, values)
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(values) => Some(values),
            ColumnValues::Text(_) => None,
        }
    }

    /// Renders the cell at `row` the way it is written to CSV; missing values
    /// become an empty string.
    pub fn cell(&self, row: usize) -> String {
        match &self.values {
            ColumnValues::Numeric(values) => match values.get(row).copied().flatten() {
                Some(v) => v.to_string(),
                None => String::new(),
            },
            ColumnValues::Text(values) => values.get(row).cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorBatch {
    name: String,
    rows: usize,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl SensorBatch {
    pub fn new(name: &str, rows: usize) -> Self {
        Self {
            name: name.to_string(),
            rows,
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a batch from raw named cell columns.
    ///
    /// Each column is classified by its header first. Sensor and score
    /// columns are parsed leniently: a cell that is not a number becomes a
    /// missing value instead of demoting the whole channel. A sensor column
    /// without a single number is carried through as text.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatch` when there are no rows and `ColumnLengthMismatch`
    /// when the columns disagree on the row count.
    pub fn from_columns(
        name: &str,
        columns: Vec<(String, Vec<String>)>,
        settings: &ChannelSettings,
    ) -> Result<Self, AirScoutError> {
        let rows = columns.first().map_or(0, |(_, cells)| cells.len());
        if rows == 0 {
            return Err(AirScoutError::EmptyBatch(name.to_string()));
        }

        let mut batch = Self::new(name, rows);
        for (column_name, cells) in columns {
            let column = match classify(&column_name, settings) {
                ColumnRole::Timestamp => Column {
                    name: column_name,
                    role: ColumnRole::Timestamp,
                    values: ColumnValues::from_cells(cells),
                },
                role @ (ColumnRole::Gas | ColumnRole::Environmental | ColumnRole::Score) => {
                    let (values, rejected) = parse_lenient(&cells);
                    if values.iter().all(Option::is_none) {
                        Column::text(&column_name, ColumnRole::Passthrough, cells)
                    } else {
                        if rejected > 0 {
                            warn!(
                                batch = name,
                                column = %column_name,
                                rejected,
                                "non-numeric cells treated as missing"
                            );
                        }
                        Column::numeric(&column_name, role, values)
                    }
                }
                _ => Column {
                    name: column_name,
                    role: ColumnRole::Passthrough,
                    values: ColumnValues::from_cells(cells),
                },
            };
            batch.push(column)?;
        }
        Ok(batch)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column(name).and_then(Column::as_numeric)
    }

    /// Replaces the values of an existing numeric column in place.
    pub fn replace_numeric(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), AirScoutError> {
        if values.len() != self.rows {
            return Err(AirScoutError::ColumnLengthMismatch(name.to_string(), values.len(), self.rows));
        }
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| AirScoutError::ColumnNotFound(name.to_string()))?;
        self.columns[i].values = ColumnValues::Numeric(values);
        Ok(())
    }

    /// Appends a column, or replaces an existing column of the same name
    /// keeping its position.
    pub fn push(&mut self, column: Column) -> Result<(), AirScoutError> {
        if column.values.len() != self.rows {
            return Err(AirScoutError::ColumnLengthMismatch(
                column.name,
                column.values.len(),
                self.rows,
            ));
        }
        match self.index.get(&column.name) {
            Some(&i) => self.columns[i] = column,
            None => {
                self.index.insert(column.name.clone(), self.columns.len());
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Names of the columns with the given role, in column order.
    pub fn channels(&self, role: ColumnRole) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.role == role)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Gas channels followed by environmental channels.
    pub fn sensor_channels(&self) -> Vec<String> {
        let mut channels = self.channels(ColumnRole::Gas);
        channels.extend(self.channels(ColumnRole::Environmental));
        channels
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

pub fn is_gas_channel(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map_or(false, |rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Role of an input column, decided by its header alone.
fn classify(name: &str, settings: &ChannelSettings) -> ColumnRole {
    if name == settings.timestamp_column {
        return ColumnRole::Timestamp;
    }
    if settings.excluded_suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
        return ColumnRole::Score;
    }
    if is_gas_channel(name, &settings.gas_sensor_prefix) {
        return ColumnRole::Gas;
    }
    let lower = name.to_lowercase();
    if settings
        .environmental_keywords
        .iter()
        .any(|keyword| lower.contains(&keyword.to_lowercase()))
    {
        return ColumnRole::Environmental;
    }
    ColumnRole::Passthrough
}
