//! Maps pollutant concentrations onto the Air Quality Index.

use crate::error::AirScoutError;
use airscout_schemas::aqi::{
    AqiBreakpoint, AqiBreakpointTable, AqiCategory, AqiResult, SensorPollutant,
};
use std::collections::HashMap;

pub const AQI_MAX: u16 = 500;

/// Piecewise-linear AQI lookup over per-pollutant breakpoint tables.
///
/// All tables are validated on construction, so `compute_aqi` is total.
#[derive(Debug, Clone)]
pub struct AqiEngine {
    tables: HashMap<String, Vec<AqiBreakpoint>>,
    categories: Vec<AqiCategory>,
    sensor_pollutants: HashMap<String, String>,
}

impl AqiEngine {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a breakpoint table is empty, not
    /// ascending or overlapping, or if the categories do not cover `0..=500`
    /// without gaps.
    pub fn new(
        tables: Vec<AqiBreakpointTable>,
        categories: Vec<AqiCategory>,
        sensor_pollutants: Vec<SensorPollutant>,
    ) -> Result<Self, AirScoutError> {
        let mut table_map = HashMap::with_capacity(tables.len());
        for table in tables {
            validate_breakpoints(&table)?;
            table_map.insert(table.pollutant, table.breakpoints);
        }

        let mut categories = categories;
        categories.sort_by_key(|c| c.aqi_low);
        validate_categories(&categories)?;

        let sensor_pollutants = sensor_pollutants
            .into_iter()
            .map(|m| (m.sensor_id, m.pollutant))
            .collect();

        Ok(Self {
            tables: table_map,
            categories,
            sensor_pollutants,
        })
    }

    /// Computes the AQI of a concentration in µg/m³.
    ///
    /// Concentrations that fall between two table rows are clamped onto the
    /// lower edge of the next row. Concentrations above the last row report
    /// the worst category with an AQI of 500.
    pub fn compute_aqi(&self, concentration: f64, pollutant: &str) -> AqiResult {
        let breakpoints = match self.tables.get(pollutant) {
            Some(breakpoints) if concentration.is_finite() && concentration > 0.0 => breakpoints,
            _ => return AqiResult::unknown(),
        };

        let Some(bp) = breakpoints.iter().find(|bp| concentration <= bp.conc_high) else {
            return self.category_for(AQI_MAX);
        };

        let c = concentration.max(bp.conc_low);
        let aqi_low = f64::from(bp.aqi_low);
        let aqi_high = f64::from(bp.aqi_high);
        let aqi = (aqi_high - aqi_low) / (bp.conc_high - bp.conc_low) * (c - bp.conc_low) + aqi_low;
        let aqi = aqi.round().clamp(0.0, f64::from(AQI_MAX)) as u16;

        self.category_for(aqi)
    }

    /// Computes the AQI for a sensor channel via its pollutant mapping.
    /// Returns `None` when the sensor has no mapping.
    pub fn compute_for_sensor(&self, sensor_id: &str, concentration: f64) -> Option<AqiResult> {
        self.pollutant_for(sensor_id)
            .map(|pollutant| self.compute_aqi(concentration, pollutant))
    }

    pub fn pollutant_for(&self, sensor_id: &str) -> Option<&str> {
        self.sensor_pollutants.get(sensor_id).map(String::as_str)
    }

    pub fn breakpoints(&self, pollutant: &str) -> Option<&[AqiBreakpoint]> {
        self.tables.get(pollutant).map(Vec::as_slice)
    }

    pub fn categories(&self) -> &[AqiCategory] {
        &self.categories
    }

    /// Rank of a category name in the category table, used to find the worst
    /// category of a series. Unknown categories rank lowest.
    pub fn severity(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == category)
    }

    fn category_for(&self, aqi: u16) -> AqiResult {
        // The table covers 0..=500, so the fallback is unreachable for valid engines.
        let category = self
            .categories
            .iter()
            .find(|c| c.aqi_low <= aqi && aqi <= c.aqi_high)
            .or_else(|| self.categories.last());

        match category {
            Some(category) => AqiResult {
                aqi,
                category: category.name.clone(),
                color: category.color.clone(),
                description: category.description.clone(),
            },
            None => AqiResult::unknown(),
        }
    }
}

impl Default for AqiEngine {
    fn default() -> Self {
        Self {
            tables: default_breakpoint_tables()
                .into_iter()
                .map(|t| (t.pollutant, t.breakpoints))
                .collect(),
            categories: default_categories(),
            sensor_pollutants: default_sensor_pollutants()
                .into_iter()
                .map(|m| (m.sensor_id, m.pollutant))
                .collect(),
        }
    }
}

fn validate_breakpoints(table: &AqiBreakpointTable) -> Result<(), AirScoutError> {
    let invalid = |reason: &str| {
        AirScoutError::InvalidConfiguration(format!(
            "AQI table for '{}' {}",
            table.pollutant, reason
        ))
    };

    if table.breakpoints.is_empty() {
        return Err(invalid("is empty"));
    }
    for bp in &table.breakpoints {
        if !(bp.conc_low.is_finite() && bp.conc_high.is_finite()) || bp.conc_high <= bp.conc_low {
            return Err(invalid("has a row whose upper bound is not above its lower bound"));
        }
        if bp.aqi_high < bp.aqi_low || bp.aqi_high > AQI_MAX {
            return Err(invalid("has an AQI range outside 0..=500"));
        }
    }
    for pair in table.breakpoints.windows(2) {
        if pair[1].conc_low < pair[0].conc_high {
            return Err(invalid("is not ascending or has overlapping rows"));
        }
        if pair[1].aqi_low < pair[0].aqi_high {
            return Err(invalid("has overlapping AQI ranges"));
        }
    }
    Ok(())
}

fn validate_categories(categories: &[AqiCategory]) -> Result<(), AirScoutError> {
    let first = categories
        .first()
        .ok_or_else(|| AirScoutError::InvalidConfiguration("AQI category table is empty".into()))?;
    if first.aqi_low != 0 {
        return Err(AirScoutError::InvalidConfiguration(
            "AQI categories must start at 0".into(),
        ));
    }
    for pair in categories.windows(2) {
        if pair[0].aqi_high.checked_add(1) != Some(pair[1].aqi_low) {
            return Err(AirScoutError::InvalidConfiguration(format!(
                "AQI categories '{}' and '{}' are not contiguous",
                pair[0].name, pair[1].name
            )));
        }
    }
    if categories.iter().any(|c| c.aqi_high < c.aqi_low) {
        return Err(AirScoutError::InvalidConfiguration(
            "AQI category with an inverted range".into(),
        ));
    }
    match categories.last() {
        Some(last) if last.aqi_high == AQI_MAX => Ok(()),
        _ => Err(AirScoutError::InvalidConfiguration(
            "AQI categories must end at 500".into(),
        )),
    }
}

fn table(pollutant: &str, rows: &[(f64, f64, u16, u16)]) -> AqiBreakpointTable {
    AqiBreakpointTable {
        pollutant: pollutant.to_string(),
        breakpoints: rows
            .iter()
            .map(|&(cl, ch, al, ah)| AqiBreakpoint::new(cl, ch, al, ah))
            .collect(),
    }
}

/// US EPA style breakpoints, with gas concentrations converted to µg/m³.
pub fn default_breakpoint_tables() -> Vec<AqiBreakpointTable> {
    vec![
        table(
            "PM2.5",
            &[
                (0.0, 12.0, 0, 50),
                (12.1, 35.4, 51, 100),
                (35.5, 55.4, 101, 150),
                (55.5, 150.4, 151, 200),
                (150.5, 250.4, 201, 300),
                (250.5, 500.4, 301, 500),
            ],
        ),
        table(
            "PM10",
            &[
                (0.0, 54.0, 0, 50),
                (55.0, 154.0, 51, 100),
                (155.0, 254.0, 101, 150),
                (255.0, 354.0, 151, 200),
                (355.0, 424.0, 201, 300),
                (425.0, 604.0, 301, 500),
            ],
        ),
        table(
            "NO2",
            &[
                (0.0, 67.0, 0, 50),
                (68.0, 134.0, 51, 100),
                (135.0, 200.0, 101, 150),
                (201.0, 267.0, 151, 200),
                (268.0, 400.0, 201, 300),
                (401.0, 603.0, 301, 500),
            ],
        ),
        table(
            "CO",
            &[
                (0.0, 4636.0, 0, 50),
                (4637.0, 9271.0, 51, 100),
                (9272.0, 12008.0, 101, 150),
                (12009.0, 15444.0, 151, 200),
                (15445.0, 18080.0, 201, 300),
                (18081.0, 22716.0, 301, 500),
            ],
        ),
        table(
            "O3",
            &[
                (0.0, 108.0, 0, 50),
                (109.0, 140.0, 51, 100),
                (141.0, 168.0, 101, 150),
                (169.0, 208.0, 151, 200),
                (209.0, 748.0, 201, 300),
                (749.0, 999.0, 301, 500),
            ],
        ),
    ]
}

pub fn default_categories() -> Vec<AqiCategory> {
    [
        (0, 50, "Good", "Green", "Air quality is satisfactory"),
        (51, 100, "Moderate", "Yellow", "Air quality is acceptable"),
        (
            101,
            150,
            "Unhealthy for Sensitive Groups",
            "Orange",
            "Sensitive groups may experience health effects",
        ),
        (151, 200, "Unhealthy", "Red", "Everyone may experience health effects"),
        (201, 300, "Very Unhealthy", "Purple", "Health alert"),
        (301, 500, "Hazardous", "Maroon", "Emergency conditions"),
    ]
    .iter()
    .map(|&(low, high, name, color, description)| AqiCategory {
        aqi_low: low,
        aqi_high: high,
        name: name.to_string(),
        color: color.to_string(),
        description: description.to_string(),
    })
    .collect()
}

pub fn default_sensor_pollutants() -> Vec<SensorPollutant> {
    [
        ("MQ135", "NO2"),
        ("MQ7", "CO"),
        ("MQ9", "CO"),
        ("PM2.5", "PM2.5"),
        ("PM10", "PM10"),
        ("O3", "O3"),
    ]
    .iter()
    .map(|&(sensor_id, pollutant)| SensorPollutant {
        sensor_id: sensor_id.to_string(),
        pollutant: pollutant.to_string(),
    })
    .collect()
}
