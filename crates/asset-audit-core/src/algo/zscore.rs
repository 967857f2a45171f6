use serde::{Deserialize, Serialize};

/// Standard score of one value against the batch it was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub score: f64,
    pub is_outlier: bool,
}

/// Batch z-score test.
///
/// The population is always the slice being scored: mean and standard
/// deviation are recomputed on every call, never carried between batches.
/// Uses the population standard deviation (divides by n).
#[derive(Debug, Clone, Copy)]
pub struct DeviationScorer {
    threshold: f64,
}

impl DeviationScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score every value; a constant batch scores zero everywhere.
    pub fn score_batch(&self, values: &[f64]) -> Vec<Deviation> {
        let Some((mean, std_dev)) = population_stats(values) else {
            return values
                .iter()
                .map(|_| Deviation {
                    score: 0.0,
                    is_outlier: false,
                })
                .collect();
        };

        values
            .iter()
            .map(|&v| {
                let score = (v - mean) / std_dev;
                Deviation {
                    score,
                    is_outlier: score.abs() > self.threshold,
                }
            })
            .collect()
    }
}

/// Mean and population standard deviation, `None` when there is no usable spread.
pub fn population_stats(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min == max {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if !std_dev.is_finite() || std_dev == 0.0 {
        return None;
    }
    Some((mean, std_dev))
}
