use airscout_schemas::reading::GasEventRecord;

/// Centered rolling mean with a fixed window.
///
/// Row `i` averages rows `i + 1 + (w - 1) / 2 - w ..= i + (w - 1) / 2`. Rows
/// whose window reaches past either end of the series, or contains a missing
/// value, have no baseline. The series is never padded or wrapped.
pub fn centered_rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = series.len();
    if window == 0 {
        return vec![None; n];
    }
    let offset = (window - 1) / 2;

    (0..n)
        .map(|i| {
            let end = i + offset + 1;
            if end > n || end < window {
                return None;
            }
            let start = end - window;
            let mut sum = 0.0;
            for value in &series[start..end] {
                match value {
                    Some(v) if v.is_finite() => sum += v,
                    _ => return None,
                }
            }
            Some(sum / window as f64)
        })
        .collect()
}

/// Flags samples that rise above `multiplier` times their rolling baseline.
pub fn detect_events(series: &[Option<f64>], window: usize, multiplier: f64) -> Vec<GasEventRecord> {
    let baselines = centered_rolling_mean(series, window);

    series
        .iter()
        .zip(baselines)
        .map(|(value, baseline)| {
            let threshold = baseline.map(|b| b * multiplier);
            let (is_event, intensity) = match (value, threshold) {
                (Some(v), Some(t)) => {
                    let ratio = (v - t) / t;
                    (*v > t, ratio.is_finite().then(|| ratio.max(0.0)))
                }
                _ => (false, None),
            };
            GasEventRecord {
                baseline,
                threshold,
                is_event,
                intensity,
            }
        })
        .collect()
}
