//! Isolation Forest for batch outlier labelling
//!
//! Anomalies are few and different, so random axis-aligned cuts isolate them
//! in fewer steps than ordinary points. The forest is fitted on the batch it
//! labels and then discarded; nothing is learned across runs.
//!
//! Key properties:
//! - Seeded: identical batch, seed and contamination give identical labels
//! - Subsampled trees (at most `max_samples` rows each), depth-limited to log2
//! - Contamination sets the decision offset from the batch's own scores
//!
//! Reference: "Isolation Forest" (Liu, Ting, Zhou, ICDM 2008)

use crate::derive::{Feature, FeatureRow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// A node in an isolation tree
#[derive(Serialize, Deserialize, Clone, Debug)]
enum IsoNode {
    /// Internal node splitting on one dimension
    Internal {
        split_dim: usize,
        split_value: f64,
        left: Box<IsoNode>,
        right: Box<IsoNode>,
    },
    /// Leaf with the number of training rows that reached it
    Leaf { size: usize },
}

/// A single isolation tree
#[derive(Serialize, Deserialize, Clone)]
struct IsoTree {
    root: IsoNode,
}

impl IsoTree {
    /// Grow a tree over the given row indices
    fn grow(data: &[Vec<f64>], indices: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_recursive(data, indices, 0, max_depth, rng),
        }
    }

    /// Path length of a point, including the expected depth below its leaf
    fn path_length(&self, point: &[f64]) -> f64 {
        path_length_recursive(&self.root, point, 0.0)
    }
}

/// Recursive tree construction
fn grow_recursive(
    data: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> IsoNode {
    if depth >= max_depth || indices.len() <= 1 {
        return IsoNode::Leaf {
            size: indices.len(),
        };
    }

    // Only dimensions that still vary can separate points
    let dims = data[indices[0]].len();
    let mut candidates = Vec::with_capacity(dims);
    for dim in 0..dims {
        let (lo, hi) = column_range(data, indices, dim);
        if lo < hi {
            candidates.push((dim, lo, hi));
        }
    }
    if candidates.is_empty() {
        return IsoNode::Leaf {
            size: indices.len(),
        };
    }

    let (split_dim, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let split_value = lo + rng.random::<f64>() * (hi - lo);

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| data[i][split_dim] <= split_value);

    IsoNode::Internal {
        split_dim,
        split_value,
        left: Box::new(grow_recursive(data, &left, depth + 1, max_depth, rng)),
        right: Box::new(grow_recursive(data, &right, depth + 1, max_depth, rng)),
    }
}

fn column_range(data: &[Vec<f64>], indices: &[usize], dim: usize) -> (f64, f64) {
    indices
        .iter()
        .map(|&i| data[i][dim])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Recursive path length calculation
fn path_length_recursive(node: &IsoNode, point: &[f64], depth: f64) -> f64 {
    match node {
        IsoNode::Leaf { size } => depth + average_path_length(*size),
        IsoNode::Internal {
            split_dim,
            split_value,
            left,
            right,
        } => {
            if point[*split_dim] <= *split_value {
                path_length_recursive(left, point, depth + 1.0)
            } else {
                path_length_recursive(right, point, depth + 1.0)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points, c(n)
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

/// Isolation Forest fitted on one batch
#[derive(Serialize, Deserialize, Clone)]
pub struct IsolationForest {
    /// Forest of trees
    trees: Vec<IsoTree>,
    /// Number of trees to grow
    n_estimators: usize,
    /// Upper bound on rows per tree
    max_samples: usize,
    /// Rows actually drawn per tree in the last fit
    sample_size: usize,
    /// Expected share of outliers
    contamination: f64,
    seed: u64,
    /// Decision offset on the negated score, set by `fit`
    offset: f64,
}

impl IsolationForest {
    /// Create an unfitted forest
    ///
    /// # Arguments
    /// * `n_estimators` - Number of trees (typically 100)
    /// * `max_samples` - Subsample size per tree (typically 256)
    /// * `contamination` - Expected outlier share, in (0, 0.5]
    /// * `seed` - Seed for subsampling and cut selection
    pub fn new(n_estimators: usize, max_samples: usize, contamination: f64, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_samples: max_samples.max(2),
            sample_size: 0,
            contamination: contamination.clamp(f64::MIN_POSITIVE, 0.5),
            seed,
            offset: f64::NEG_INFINITY,
        }
    }

    /// Fit on a row-major matrix of finite values
    pub fn fit(&mut self, data: &[Vec<f64>]) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = data.len();
        self.sample_size = self.max_samples.min(n);
        let max_depth = (self.sample_size.max(2) as f64).log2().ceil() as usize;

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let indices = rand::seq::index::sample(&mut rng, n, self.sample_size).into_vec();
                IsoTree::grow(data, &indices, max_depth, &mut rng)
            })
            .collect();

        let negated: Vec<f64> = self.score_samples(data).iter().map(|s| -s).collect();
        self.offset = percentile(&negated, self.contamination);
    }

    /// Anomaly score per row in (0, 1]; higher is more anomalous
    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        let normalizer = average_path_length(self.sample_size);
        if self.trees.is_empty() || normalizer <= 0.0 {
            return vec![0.5; data.len()];
        }

        data.iter()
            .map(|row| {
                let total: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
                let mean_depth = total / self.trees.len() as f64;
                2f64.powf(-mean_depth / normalizer)
            })
            .collect()
    }

    /// Label rows +1 (inlier) or -1 (outlier) using the fitted offset
    pub fn predict(&self, data: &[Vec<f64>]) -> Vec<i8> {
        self.score_samples(data)
            .iter()
            .map(|s| if -s < self.offset { -1 } else { 1 })
            .collect()
    }

    pub fn fit_predict(&mut self, data: &[Vec<f64>]) -> Vec<i8> {
        self.fit(data);
        self.predict(data)
    }

    /// Get forest statistics: (trees, rows per tree, offset)
    pub fn get_stats(&self) -> (usize, usize, f64) {
        (self.trees.len(), self.sample_size, self.offset)
    }
}

/// Linear-interpolated quantile `q` in [0, 1] of the values
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Why a feature matrix cannot be modelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degenerate {
    /// Every value of the column is missing or non-finite
    EmptyColumn(Feature),
    /// Fewer than two distinct rows after imputation
    TooFewDistinctRows(usize),
}

/// Row-major feature matrix built from derived metrics
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    columns: Vec<Feature>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_rows<M: FeatureRow>(metrics: &[M], columns: &[Feature]) -> Self {
        let rows = metrics
            .iter()
            .map(|m| columns.iter().map(|&f| m.feature(f)).collect())
            .collect();
        Self {
            columns: columns.to_vec(),
            rows,
        }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace non-finite values with the median of the column's finite values
    pub fn impute_medians(&mut self) -> Result<usize, Degenerate> {
        let mut replaced = 0;
        for (col, &feature) in self.columns.iter().enumerate() {
            let mut finite: Vec<f64> = self
                .rows
                .iter()
                .map(|r| r[col])
                .filter(|v| v.is_finite())
                .collect();
            if finite.is_empty() {
                return Err(Degenerate::EmptyColumn(feature));
            }
            if finite.len() == self.rows.len() {
                continue;
            }
            let median = median(&mut finite);
            for row in &mut self.rows {
                if !row[col].is_finite() {
                    row[col] = median;
                    replaced += 1;
                }
            }
        }
        Ok(replaced)
    }

    pub fn distinct_rows(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
            .collect::<HashSet<_>>()
            .len()
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Isolation Forest detector that fails closed on degenerate input
#[derive(Debug, Clone, Copy)]
pub struct ModelOutlierDetector {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
}

impl ModelOutlierDetector {
    pub fn new(n_estimators: usize, max_samples: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_estimators,
            max_samples,
            contamination,
            seed,
        }
    }

    /// Refit on this batch and return one outlier flag per row.
    ///
    /// A matrix that cannot be modelled yields no outliers.
    pub fn detect(&self, mut matrix: FeatureMatrix) -> Vec<bool> {
        let n = matrix.len();
        if n == 0 {
            return Vec::new();
        }

        match matrix.impute_medians() {
            Ok(0) => {}
            Ok(replaced) => debug!(replaced, "non-finite features replaced by column median"),
            Err(reason) => {
                warn!(?reason, rows = n, "feature matrix degenerate; no model outliers flagged");
                return vec![false; n];
            }
        }

        let distinct = matrix.distinct_rows();
        if distinct < 2 {
            let reason = Degenerate::TooFewDistinctRows(distinct);
            warn!(?reason, rows = n, "feature matrix degenerate; no model outliers flagged");
            return vec![false; n];
        }

        let mut forest = IsolationForest::new(
            self.n_estimators,
            self.max_samples,
            self.contamination,
            self.seed,
        );
        let labels = forest.fit_predict(matrix.rows());
        let (trees, sample_size, offset) = forest.get_stats();
        debug!(trees, sample_size, offset, "isolation forest fitted");

        labels.into_iter().map(|label| label == -1).collect()
    }
}
