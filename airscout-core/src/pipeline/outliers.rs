use airscout_schemas::reading::OutlierRecord;

/// Mean and sample standard deviation of the valid values of a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStatistics {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
}

impl BatchStatistics {
    /// Two-pass mean / standard deviation (n - 1 denominator). Returns `None`
    /// when fewer than two valid values are present.
    pub fn compute(series: &[Option<f64>]) -> Option<Self> {
        let valid = || series.iter().filter_map(|v| *v).filter(|v| v.is_finite());

        let count = valid().count();
        if count < 2 {
            return None;
        }
        let mean = valid().sum::<f64>() / count as f64;
        let variance = valid().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;

        Some(Self {
            count,
            mean,
            std: variance.sqrt(),
        })
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.std.is_finite() && self.std > 0.0)
    }
}

/// Marks values whose z-score over the whole batch exceeds `threshold`.
///
/// A channel with zero spread (or fewer than two values) gets a z-score of
/// zero on every row and no outliers. Missing values get no z-score.
pub fn mark_outliers(series: &[Option<f64>], threshold: f64) -> Vec<OutlierRecord> {
    let stats = match BatchStatistics::compute(series) {
        Some(stats) if !stats.is_degenerate() => stats,
        _ => {
            return vec![
                OutlierRecord {
                    zscore: Some(0.0),
                    is_outlier: false,
                };
                series.len()
            ]
        }
    };

    series
        .iter()
        .map(|value| {
            let zscore = value
                .filter(|v| v.is_finite())
                .map(|v| (v - stats.mean) / stats.std);
            OutlierRecord {
                zscore,
                is_outlier: zscore.map_or(false, |z| z.abs() > threshold),
            }
        })
        .collect()
}
