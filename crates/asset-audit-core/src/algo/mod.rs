pub mod isolation_forest;
pub mod zscore;

// Re-exports for convenience
pub use isolation_forest::{Degenerate, FeatureMatrix, IsolationForest, ModelOutlierDetector};
pub use zscore::{Deviation, DeviationScorer};
