//! Isolation forest outlier scoring (Liu, Ting & Zhou, 2008).
//!
//! Each tree isolates a random subsample by recursive random splits. Points
//! that are isolated after few splits are anomalous. Scores follow the usual
//! convention `-2^(-E[h(x)] / c(psi))`, so lower means more anomalous, and
//! the rows scoring below the `contamination` quantile are labelled as
//! anomalies.

use super::anomaly::{AnomalyParams, ModelOutput, OutlierModel};
use anyhow::{bail, ensure};
use ndarray::{Array2, ArrayView1};
use rand::{seq::index::sample, Rng, SeedableRng};
use rand_isaac::Isaac64Rng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
pub struct IsolationForest {
    /// Upper bound of the subsample drawn for each tree.
    pub max_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self { max_samples: 256 }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, value: f64, left: usize, right: usize },
}

/// A single isolation tree stored as an arena of nodes; node 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow<R: Rng>(matrix: &Array2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut R) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(matrix, rows, 0, height_limit, rng);
        tree
    }

    fn grow_node<R: Rng>(
        &mut self,
        matrix: &Array2<f64>,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut R,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let candidates: Vec<(usize, f64, f64)> = (0..matrix.ncols())
            .filter_map(|feature| {
                let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = matrix[[r, feature]];
                    (lo.min(v), hi.max(v))
                });
                (max > min).then_some((feature, min, max))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let value = rng.gen_range(min..max);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| matrix[[r, feature]] < value);

        let left = self.grow_node(matrix, left_rows, depth + 1, height_limit, rng);
        let right = self.grow_node(matrix, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` points; normalises path lengths across subsample sizes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile of `values`, `q` in `[0, 1]`.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

impl IsolationForest {
    /// Isolation scores of every row of `matrix`.
    pub fn score_samples(&self, matrix: &Array2<f64>, estimators: usize, seed: u64) -> anyhow::Result<Vec<f64>> {
        let rows = matrix.nrows();
        ensure!(rows >= 2, "need at least two rows, got {}", rows);
        ensure!(matrix.ncols() > 0, "need at least one feature");
        ensure!(estimators > 0, "need at least one estimator");
        ensure!(self.max_samples >= 2, "max_samples must be at least 2");
        if matrix.iter().any(|v| !v.is_finite()) {
            bail!("matrix contains non-finite values");
        }

        let subsample = self.max_samples.min(rows);
        let height_limit = (subsample as f64).log2().ceil() as usize;
        let mut rng = Isaac64Rng::seed_from_u64(seed);

        let trees: Vec<IsolationTree> = (0..estimators)
            .map(|_| {
                let rows = sample(&mut rng, rows, subsample).into_vec();
                IsolationTree::grow(matrix, rows, height_limit, &mut rng)
            })
            .collect();

        let normaliser = average_path_length(subsample);
        let scores = matrix
            .rows()
            .into_iter()
            .map(|point| {
                let mean_path = trees.iter().map(|t| t.path_length(point)).sum::<f64>() / estimators as f64;
                -(2f64.powf(-mean_path / normaliser))
            })
            .collect();
        Ok(scores)
    }
}

impl OutlierModel for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn fit_predict(&self, matrix: &Array2<f64>, params: &AnomalyParams) -> anyhow::Result<ModelOutput> {
        ensure!(
            params.contamination > 0.0 && params.contamination <= 0.5,
            "contamination must be in (0, 0.5], got {}",
            params.contamination
        );

        let scores = self.score_samples(matrix, params.estimators, params.seed)?;
        let offset = quantile(&scores, params.contamination);
        let labels = scores.iter().map(|&s| s < offset).collect();

        Ok(ModelOutput { labels, scores })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn clustered_with_outlier() -> Array2<f64> {
        let mut matrix = Array2::<f64>::zeros((101, 2));
        for i in 0..100 {
            let t = i as f64;
            matrix[[i, 0]] = (t * 0.3).sin() * 0.5;
            matrix[[i, 1]] = (t * 0.7).cos() * 0.5;
        }
        matrix[[100, 0]] = 12.0;
        matrix[[100, 1]] = -12.0;
        matrix
    }

    fn params(seed: u64) -> AnomalyParams {
        AnomalyParams {
            contamination: 0.05,
            estimators: 100,
            seed,
        }
    }

    #[test]
    fn average_path_length_matches_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        approx::assert_relative_eq!(average_path_length(256), 10.244_770_920_297_76, epsilon = 1e-9);
    }

    #[test]
    fn far_point_gets_the_lowest_score() {
        let output = IsolationForest::default()
            .fit_predict(&clustered_with_outlier(), &params(42))
            .unwrap();
        let lowest = output
            .scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(lowest, Some(100));
        assert!(output.labels[100]);
        assert!(output.scores.iter().all(|&s| (-1.0..0.0).contains(&s)));
    }

    #[test]
    fn labels_roughly_follow_contamination() {
        let output = IsolationForest::default()
            .fit_predict(&clustered_with_outlier(), &params(7))
            .unwrap();
        let flagged = output.labels.iter().filter(|&&l| l).count();
        assert!((1..=6).contains(&flagged), "flagged {}", flagged);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let matrix = clustered_with_outlier();
        let forest = IsolationForest::default();
        let a = forest.fit_predict(&matrix, &params(3)).unwrap();
        let b = forest.fit_predict(&matrix, &params(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn identical_rows_have_no_anomalies() {
        let matrix = Array2::<f64>::zeros((50, 3));
        let output = IsolationForest::default().fit_predict(&matrix, &params(1)).unwrap();
        assert!(output.labels.iter().all(|&l| !l));
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let matrix = Array2::<f64>::zeros((1, 3));
        assert!(IsolationForest::default().fit_predict(&matrix, &params(1)).is_err());
    }
}
