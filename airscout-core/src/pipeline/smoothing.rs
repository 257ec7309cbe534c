use super::state::SeriesState;
use crate::{batch::SensorBatch, error::AirScoutError};
use airscout_schemas::settings::SmoothingSettings;
use tracing::debug;

/// Smoothing weight of an EMA with the given span.
pub fn alpha_for_span(span: u32) -> f64 {
    2.0 / (f64::from(span) + 1.0)
}

/// Exponential moving average over a channel in row order.
pub fn smooth(series: &[Option<f64>], span: u32) -> Vec<Option<f64>> {
    let alpha = alpha_for_span(span);
    let mut state = SeriesState::new();
    series.iter().map(|&value| state.update(value, alpha)).collect()
}

/// Smooths every sensor channel of the batch that is not excluded, replacing
/// the channel values. Returns the names of the smoothed channels.
pub fn smooth_batch(
    batch: &mut SensorBatch,
    settings: &SmoothingSettings,
) -> Result<Vec<String>, AirScoutError> {
    let channels: Vec<String> = batch
        .sensor_channels()
        .into_iter()
        .filter(|name| !settings.excluded_channels.contains(name))
        .collect();

    for channel in &channels {
        let smoothed = match batch.numeric(channel) {
            Some(values) => smooth(values, settings.span),
            None => continue,
        };
        batch.replace_numeric(channel, smoothed)?;
    }

    debug!(batch = batch.name(), channels = channels.len(), span = settings.span, "EMA smoothing applied");
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Column, ColumnRole};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn follows_the_recursive_definition() {
        let out = smooth(&[Some(1.0), Some(4.0), Some(4.0)], 2);
        let alpha = 2.0 / 3.0;
        assert_eq!(out[0], Some(1.0));
        assert_relative_eq!(out[1].unwrap(), alpha * 4.0 + (1.0 - alpha) * 1.0);
        assert_relative_eq!(out[2].unwrap(), alpha * 4.0 + (1.0 - alpha) * out[1].unwrap());
    }

    #[test]
    fn seeds_on_first_valid_sample_and_carries_gaps() {
        let out = smooth(&[None, Some(2.0), None, Some(2.0)], 5);
        assert_eq!(out, vec![None, Some(2.0), Some(2.0), Some(2.0)]);
    }

    #[test]
    fn span_one_is_identity() {
        let input = vec![Some(1.0), Some(7.5), Some(-3.0)];
        assert_eq!(smooth(&input, 1), input);
    }

    #[test]
    fn excluded_and_non_sensor_channels_are_untouched() {
        let mut batch = SensorBatch::new("t", 3);
        let raw = vec![Some(0.0), Some(10.0), Some(0.0)];
        batch.push(Column::numeric("MQ2", ColumnRole::Gas, raw.clone())).unwrap();
        batch.push(Column::numeric("Humidity", ColumnRole::Environmental, raw.clone())).unwrap();
        batch.push(Column::numeric("GPS_Lat", ColumnRole::Passthrough, raw.clone())).unwrap();

        let settings = SmoothingSettings {
            span: 3,
            excluded_channels: vec!["Humidity".to_string()],
        };
        let smoothed = smooth_batch(&mut batch, &settings).unwrap();

        assert_eq!(smoothed, vec!["MQ2"]);
        assert_eq!(batch.numeric("MQ2").unwrap(), &[Some(0.0), Some(5.0), Some(2.5)]);
        assert_eq!(batch.numeric("Humidity").unwrap(), raw.as_slice());
        assert_eq!(batch.numeric("GPS_Lat").unwrap(), raw.as_slice());
    }

    proptest! {
        #[test]
        fn constant_input_is_a_fixed_point(v in -1.0e6..1.0e6f64, len in 1usize..200, span in 1u32..50) {
            let out = smooth(&vec![Some(v); len], span);
            prop_assert!(out.iter().all(|&x| x == Some(v)));
        }
    }
}
