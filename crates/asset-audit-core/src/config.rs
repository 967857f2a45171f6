//! Audit configuration
//!
//! Every tunable the engine uses is carried here rather than hardcoded in the
//! stages: per-class thresholds and feature lists, model contamination and
//! seed, coercion fallbacks, and the shared audit reference timestamp.
//! All fields have defaults so a partial JSON document is a valid config.

use crate::derive::Feature;
use crate::error::AuditError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CONTAMINATION: f64 = 0.10;
pub const DEFAULT_ESTIMATORS: usize = 100;
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Unparseable dates fall back to this day.
pub fn default_fallback_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

/// Isolation Forest parameters shared by every class that runs the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Expected share of outliers in a batch, in (0, 0.5]
    pub contamination: f64,
    pub n_estimators: usize,
    /// Subsample size per tree, capped at the batch size
    pub max_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            n_estimators: DEFAULT_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineryPolicy {
    /// |z| above this marks a statistical outlier on acquisition value
    pub threshold: f64,
    pub features: Vec<Feature>,
}

impl Default for MachineryPolicy {
    fn default() -> Self {
        Self {
            threshold: 2.5,
            features: vec![
                Feature::AcquisitionValue,
                Feature::AgeYears,
                Feature::RemainingLifeYears,
            ],
        }
    }
}

/// Half-open range of whole years, `min..max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealEstatePolicy {
    pub threshold: f64,
    pub features: Vec<Feature>,
    /// Useful life drawn for records with no end-of-life date at all
    pub synthesized_life_years: YearRange,
    /// Useful life assumed when an end-of-life date is present but unreadable
    pub unparseable_life_years: u32,
}

impl Default for RealEstatePolicy {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            features: vec![
                Feature::AcquisitionValue,
                Feature::AgeYears,
                Feature::RemainingLifeYears,
                Feature::SurfaceArea,
            ],
            synthesized_life_years: YearRange { min: 50, max: 100 },
            unparseable_life_years: 75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntangiblePolicy {
    /// Net book value discrepancies within this amount are rounding noise
    pub book_value_tolerance: f64,
}

impl Default for IntangiblePolicy {
    fn default() -> Self {
        Self {
            book_value_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherAssetPolicy {
    pub stale_after_days: i64,
}

impl Default for OtherAssetPolicy {
    fn default() -> Self {
        Self {
            stale_after_days: 90,
        }
    }
}

/// What the pipeline does when a class batch has a structural defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralErrorPolicy {
    /// Abort the run and return the error
    #[default]
    Halt,
    /// Record the failure in the report and continue with the other classes
    SkipClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Audit reference timestamp; `None` captures the clock once at run start
    pub reference: Option<DateTime<Utc>>,
    pub seed: u64,
    pub fallback_date: NaiveDate,
    pub model: ModelConfig,
    pub machinery: MachineryPolicy,
    pub real_estate: RealEstatePolicy,
    pub intangibles: IntangiblePolicy,
    pub other_assets: OtherAssetPolicy,
    pub on_structural_error: StructuralErrorPolicy,
    /// Audit the four classes on scoped threads
    pub parallel_classes: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reference: None,
            seed: DEFAULT_SEED,
            fallback_date: default_fallback_date(),
            model: ModelConfig::default(),
            machinery: MachineryPolicy::default(),
            real_estate: RealEstatePolicy::default(),
            intangibles: IntangiblePolicy::default(),
            other_assets: OtherAssetPolicy::default(),
            on_structural_error: StructuralErrorPolicy::default(),
            parallel_classes: false,
        }
    }
}

impl AuditConfig {
    pub fn with_reference(mut self, reference: DateTime<Utc>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        let contamination = self.model.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(AuditError::invalid_config(
                "model.contamination",
                format!("{} is outside (0, 0.5]", contamination),
            ));
        }
        if self.model.n_estimators == 0 {
            return Err(AuditError::invalid_config(
                "model.n_estimators",
                "at least one tree is required",
            ));
        }
        if self.model.max_samples < 2 {
            return Err(AuditError::invalid_config(
                "model.max_samples",
                "subsample size must be at least 2",
            ));
        }

        check_threshold("machinery.threshold", self.machinery.threshold)?;
        check_threshold("real_estate.threshold", self.real_estate.threshold)?;
        check_features("machinery.features", &self.machinery.features)?;
        check_features("real_estate.features", &self.real_estate.features)?;
        if self.machinery.features.contains(&Feature::SurfaceArea) {
            return Err(AuditError::invalid_config(
                "machinery.features",
                "machinery records carry no surface area",
            ));
        }

        let range = self.real_estate.synthesized_life_years;
        if range.min >= range.max {
            return Err(AuditError::invalid_config(
                "real_estate.synthesized_life_years",
                format!("empty range {}..{}", range.min, range.max),
            ));
        }

        let tolerance = self.intangibles.book_value_tolerance;
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(AuditError::invalid_config(
                "intangibles.book_value_tolerance",
                "must be a non-negative amount",
            ));
        }

        Ok(())
    }
}

fn check_threshold(parameter: &'static str, threshold: f64) -> Result<(), AuditError> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(AuditError::invalid_config(
            parameter,
            format!("{} is not a positive z-score", threshold),
        ))
    }
}

fn check_features(parameter: &'static str, features: &[Feature]) -> Result<(), AuditError> {
    if features.is_empty() {
        return Err(AuditError::invalid_config(parameter, "feature list is empty"));
    }
    for (i, feature) in features.iter().enumerate() {
        if features[..i].contains(feature) {
            return Err(AuditError::invalid_config(
                parameter,
                format!("duplicate feature {:?}", feature),
            ));
        }
    }
    Ok(())
}
