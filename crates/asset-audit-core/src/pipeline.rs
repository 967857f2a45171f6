//! Audit Pipeline
//!
//! Each asset class runs through its own auditor:
//! 1. Metric Deriver: coerce inputs, derive age / life / amortization
//! 2. Statistical Outlier Detector: batch z-score on acquisition value
//! 3. Unsupervised Anomaly Detector: Isolation Forest over the class features
//! 4. Verdict Combiner: class-specific combination of both flags
//!
//! Steps 2-4 only exist for classes that produce a verdict. Classes share no
//! state; the supplied batches are borrowed and a new enriched batch is
//! returned, with exactly one output record per input record.

use crate::algo::isolation_forest::{FeatureMatrix, ModelOutlierDetector};
use crate::algo::zscore::DeviationScorer;
use crate::config::{
    AuditConfig, IntangiblePolicy, MachineryPolicy, ModelConfig, OtherAssetPolicy,
    RealEstatePolicy, StructuralErrorPolicy,
};
use crate::derive::{
    self, CoercionStats, Feature, FeatureRow, IntangibleMetrics, LifecycleMetrics,
    OtherAssetMetrics, RealEstateMetrics,
};
use crate::error::AuditError;
use crate::record::{
    AssetClass, IntangibleRecord, MachineryRecord, OtherAssetRecord, Portfolio, RealEstateRecord,
};
use crate::verdict::{AnomalySignals, AuditOutcome, CombinationPolicy, Discrepancy};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{Dispatch, Span, debug, dispatcher, info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// CORE ABSTRACTIONS
// ============================================================================

/// Values fixed once per run and shared by every record and class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditContext {
    pub run_id: Uuid,
    pub reference: DateTime<Utc>,
    pub seed: u64,
    pub fallback_date: NaiveDate,
}

impl AuditContext {
    /// Capture the reference timestamp, reading the clock if none is configured
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            reference: config.reference.unwrap_or_else(Utc::now),
            seed: config.seed,
            fallback_date: config.fallback_date,
        }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference.date_naive()
    }
}

/// One enriched record: the original, its derived metrics and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audited<R, M> {
    pub record: R,
    pub metrics: M,
    pub outcome: AuditOutcome,
}

/// Enriched batch of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAudit<R, M> {
    pub records: Vec<Audited<R, M>>,
    pub coercions: CoercionStats,
}

impl<R, M> Default for ClassAudit<R, M> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            coercions: CoercionStats::default(),
        }
    }
}

impl<R, M> ClassAudit<R, M> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Audited<R, M>> {
        self.records
            .iter()
            .filter(|a| a.outcome.verdict().is_some_and(|v| v.is_alert()))
    }
}

/// Trait for all per-class auditors
pub trait ClassAuditor: Send + Sync {
    type Record;
    type Metrics;

    fn class(&self) -> AssetClass;

    /// Whether records of this class receive a categorical verdict
    fn produces_verdict(&self) -> bool;

    fn audit(
        &self,
        batch: &[Self::Record],
        ctx: &AuditContext,
    ) -> Result<ClassAudit<Self::Record, Self::Metrics>, AuditError>;
}

pub type MachineryAudit = ClassAudit<MachineryRecord, LifecycleMetrics>;
pub type RealEstateAudit = ClassAudit<RealEstateRecord, RealEstateMetrics>;
pub type IntangibleAudit = ClassAudit<IntangibleRecord, IntangibleMetrics>;
pub type OtherAssetAudit = ClassAudit<OtherAssetRecord, OtherAssetMetrics>;

// ============================================================================
// SHARED STAGES
// ============================================================================

/// Fail when every record of a non-empty batch lacks the field
fn require_field<R>(
    class: AssetClass,
    batch: &[R],
    field: &'static str,
    present: impl Fn(&R) -> bool,
) -> Result<(), AuditError> {
    if batch.is_empty() || batch.iter().any(present) {
        Ok(())
    } else {
        Err(AuditError::MissingField { class, field })
    }
}

/// Stages 2-4 for verdict classes: z-score, model, combination
fn detect_and_combine<M: FeatureRow>(
    class: AssetClass,
    metrics: &[M],
    scorer: DeviationScorer,
    features: &[Feature],
    model: &ModelConfig,
    seed: u64,
    policy: CombinationPolicy,
) -> Vec<AuditOutcome> {
    let values: Vec<f64> = metrics
        .iter()
        .map(|m| m.feature(Feature::AcquisitionValue))
        .collect();
    let deviations = scorer.score_batch(&values);

    let detector =
        ModelOutlierDetector::new(model.n_estimators, model.max_samples, model.contamination, seed);
    let model_flags = detector.detect(FeatureMatrix::from_rows(metrics, features));

    let statistical = deviations.iter().filter(|d| d.is_outlier).count();
    let modelled = model_flags.iter().filter(|&&f| f).count();
    debug!(
        %class,
        threshold = scorer.threshold(),
        statistical,
        modelled,
        "detectors finished"
    );

    deviations
        .into_iter()
        .zip(model_flags)
        .map(|(deviation, is_model_outlier)| AuditOutcome::WithVerdict {
            signals: AnomalySignals {
                deviation_score: deviation.score,
                is_statistical_outlier: deviation.is_outlier,
                is_model_outlier,
            },
            verdict: policy.combine(deviation.is_outlier, is_model_outlier),
        })
        .collect()
}

fn assemble<R: Clone, M>(
    batch: &[R],
    metrics: Vec<M>,
    outcomes: Vec<AuditOutcome>,
    coercions: CoercionStats,
) -> ClassAudit<R, M> {
    let records = batch
        .iter()
        .cloned()
        .zip(metrics)
        .zip(outcomes)
        .map(|((record, metrics), outcome)| Audited {
            record,
            metrics,
            outcome,
        })
        .collect();
    ClassAudit { records, coercions }
}

// ============================================================================
// CLASS AUDITORS
// ============================================================================

pub struct MachineryAuditor {
    policy: MachineryPolicy,
    model: ModelConfig,
}

impl MachineryAuditor {
    pub fn new(policy: MachineryPolicy, model: ModelConfig) -> Self {
        Self { policy, model }
    }
}

impl ClassAuditor for MachineryAuditor {
    type Record = MachineryRecord;
    type Metrics = LifecycleMetrics;

    fn class(&self) -> AssetClass {
        AssetClass::Machinery
    }

    fn produces_verdict(&self) -> bool {
        true
    }

    fn audit(&self, batch: &[MachineryRecord], ctx: &AuditContext) -> Result<MachineryAudit, AuditError> {
        let class = self.class();
        require_field(class, batch, "acquisition_value", |r| !r.acquisition_value.is_missing())?;
        for feature in &self.policy.features {
            match feature {
                Feature::AcquisitionValue | Feature::SurfaceArea => {}
                Feature::AgeYears => {
                    require_field(class, batch, feature.source_field(), |r| {
                        !r.acquisition_date.is_missing()
                    })?;
                }
                Feature::RemainingLifeYears => {
                    require_field(class, batch, feature.source_field(), |r| {
                        !r.end_of_life_date.is_missing() || !r.useful_life_years.is_missing()
                    })?;
                }
            }
        }

        let mut coercions = CoercionStats::default();
        let metrics: Vec<LifecycleMetrics> = batch
            .iter()
            .map(|r| derive::derive_machinery(r, ctx, &mut coercions))
            .collect();

        let outcomes = detect_and_combine(
            class,
            &metrics,
            DeviationScorer::new(self.policy.threshold),
            &self.policy.features,
            &self.model,
            ctx.seed,
            CombinationPolicy::PriorityLadder,
        );
        Ok(assemble(batch, metrics, outcomes, coercions))
    }
}

pub struct RealEstateAuditor {
    policy: RealEstatePolicy,
    model: ModelConfig,
}

impl RealEstateAuditor {
    pub fn new(policy: RealEstatePolicy, model: ModelConfig) -> Self {
        Self { policy, model }
    }
}

impl ClassAuditor for RealEstateAuditor {
    type Record = RealEstateRecord;
    type Metrics = RealEstateMetrics;

    fn class(&self) -> AssetClass {
        AssetClass::RealEstate
    }

    fn produces_verdict(&self) -> bool {
        true
    }

    fn audit(&self, batch: &[RealEstateRecord], ctx: &AuditContext) -> Result<RealEstateAudit, AuditError> {
        let class = self.class();
        require_field(class, batch, "acquisition_value", |r| !r.acquisition_value.is_missing())?;
        for feature in &self.policy.features {
            match feature {
                // end of life is synthesized when absent
                Feature::AcquisitionValue | Feature::RemainingLifeYears => {}
                Feature::AgeYears => {
                    require_field(class, batch, feature.source_field(), |r| {
                        !r.acquisition_date.is_missing()
                    })?;
                }
                Feature::SurfaceArea => {
                    require_field(class, batch, feature.source_field(), |r| {
                        !r.surface_area.is_missing()
                    })?;
                }
            }
        }

        let mut coercions = CoercionStats::default();
        let metrics: Vec<RealEstateMetrics> = batch
            .iter()
            .map(|r| derive::derive_real_estate(r, &self.policy, ctx, &mut coercions))
            .collect();

        let outcomes = detect_and_combine(
            class,
            &metrics,
            DeviationScorer::new(self.policy.threshold),
            &self.policy.features,
            &self.model,
            ctx.seed,
            CombinationPolicy::ThreeWay,
        );
        Ok(assemble(batch, metrics, outcomes, coercions))
    }
}

pub struct IntangibleAuditor {
    policy: IntangiblePolicy,
}

impl IntangibleAuditor {
    pub fn new(policy: IntangiblePolicy) -> Self {
        Self { policy }
    }
}

impl ClassAuditor for IntangibleAuditor {
    type Record = IntangibleRecord;
    type Metrics = IntangibleMetrics;

    fn class(&self) -> AssetClass {
        AssetClass::Intangible
    }

    fn produces_verdict(&self) -> bool {
        false
    }

    fn audit(&self, batch: &[IntangibleRecord], ctx: &AuditContext) -> Result<IntangibleAudit, AuditError> {
        let mut coercions = CoercionStats::default();
        let metrics: Vec<IntangibleMetrics> = batch
            .iter()
            .map(|r| derive::derive_intangible(r, &self.policy, ctx, &mut coercions))
            .collect();
        let outcomes = metrics
            .iter()
            .map(|m| AuditOutcome::DiscrepancyOnly {
                discrepancy: Discrepancy::BookValue {
                    discrepancy_vnc: m.discrepancy_vnc,
                    amortization_discrepancy: m.amortization_discrepancy,
                    exceeds_tolerance: m.has_book_value_discrepancy,
                },
            })
            .collect();
        Ok(assemble(batch, metrics, outcomes, coercions))
    }
}

pub struct OtherAssetAuditor {
    policy: OtherAssetPolicy,
}

impl OtherAssetAuditor {
    pub fn new(policy: OtherAssetPolicy) -> Self {
        Self { policy }
    }
}

impl ClassAuditor for OtherAssetAuditor {
    type Record = OtherAssetRecord;
    type Metrics = OtherAssetMetrics;

    fn class(&self) -> AssetClass {
        AssetClass::OtherAsset
    }

    fn produces_verdict(&self) -> bool {
        false
    }

    fn audit(&self, batch: &[OtherAssetRecord], ctx: &AuditContext) -> Result<OtherAssetAudit, AuditError> {
        let mut coercions = CoercionStats::default();
        let metrics: Vec<OtherAssetMetrics> = batch
            .iter()
            .map(|r| derive::derive_other_asset(r, &self.policy, ctx, &mut coercions))
            .collect();
        let outcomes = metrics
            .iter()
            .map(|m| AuditOutcome::DiscrepancyOnly {
                discrepancy: Discrepancy::Aging {
                    days_since_registration: m.days_since_registration,
                    is_stale: m.is_stale,
                },
            })
            .collect();
        Ok(assemble(batch, metrics, outcomes, coercions))
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// A class left out of the report under `StructuralErrorPolicy::SkipClass`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFailure {
    pub class: AssetClass,
    pub message: String,
}

/// Enriched portfolio produced by one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub reference: DateTime<Utc>,
    pub seed: u64,
    pub machinery: MachineryAudit,
    pub real_estate: RealEstateAudit,
    pub intangibles: IntangibleAudit,
    pub other_assets: OtherAssetAudit,
    #[serde(default)]
    pub failures: Vec<ClassFailure>,
}

impl AuditReport {
    pub fn record_count(&self) -> usize {
        self.machinery.len() + self.real_estate.len() + self.intangibles.len() + self.other_assets.len()
    }

    pub fn is_skipped(&self, class: AssetClass) -> bool {
        self.failures.iter().any(|f| f.class == class)
    }
}

pub struct AuditPipeline {
    config: AuditConfig,
    machinery: MachineryAuditor,
    real_estate: RealEstateAuditor,
    intangibles: IntangibleAuditor,
    other_assets: OtherAssetAuditor,
}

impl AuditPipeline {
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        config.validate()?;
        Ok(Self {
            machinery: MachineryAuditor::new(config.machinery.clone(), config.model.clone()),
            real_estate: RealEstateAuditor::new(config.real_estate.clone(), config.model.clone()),
            intangibles: IntangibleAuditor::new(config.intangibles.clone()),
            other_assets: OtherAssetAuditor::new(config.other_assets.clone()),
            config,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Context for a new run; the reference timestamp is fixed here
    pub fn context(&self) -> AuditContext {
        AuditContext::from_config(&self.config)
    }

    pub fn machinery(&self) -> &MachineryAuditor {
        &self.machinery
    }

    pub fn real_estate(&self) -> &RealEstateAuditor {
        &self.real_estate
    }

    pub fn intangibles(&self) -> &IntangibleAuditor {
        &self.intangibles
    }

    pub fn other_assets(&self) -> &OtherAssetAuditor {
        &self.other_assets
    }

    /// Audit every class of the portfolio under one shared context
    pub fn run(&self, portfolio: &Portfolio) -> Result<AuditReport, AuditError> {
        let ctx = self.context();
        let span = info_span!("audit_run", run_id = %ctx.run_id);
        let _guard = span.enter();
        info!(
            records = portfolio.len(),
            reference = %ctx.reference,
            seed = ctx.seed,
            parallel = self.config.parallel_classes,
            "audit run started"
        );

        let (machinery, real_estate, intangibles, other_assets) = if self.config.parallel_classes {
            // worker threads start without the caller's subscriber or span
            let dispatch = dispatcher::get_default(Dispatch::clone);
            thread::scope(|s| {
                let m = s.spawn(|| {
                    in_run(&dispatch, &span, || {
                        audit_class(&self.machinery, &portfolio.machinery, &ctx)
                    })
                });
                let r = s.spawn(|| {
                    in_run(&dispatch, &span, || {
                        audit_class(&self.real_estate, &portfolio.real_estate, &ctx)
                    })
                });
                let i = s.spawn(|| {
                    in_run(&dispatch, &span, || {
                        audit_class(&self.intangibles, &portfolio.intangibles, &ctx)
                    })
                });
                let o = s.spawn(|| {
                    in_run(&dispatch, &span, || {
                        audit_class(&self.other_assets, &portfolio.other_assets, &ctx)
                    })
                });
                (join(m), join(r), join(i), join(o))
            })
        } else {
            (
                audit_class(&self.machinery, &portfolio.machinery, &ctx),
                audit_class(&self.real_estate, &portfolio.real_estate, &ctx),
                audit_class(&self.intangibles, &portfolio.intangibles, &ctx),
                audit_class(&self.other_assets, &portfolio.other_assets, &ctx),
            )
        };

        let mut failures = Vec::new();
        let report = AuditReport {
            run_id: ctx.run_id,
            reference: ctx.reference,
            seed: ctx.seed,
            machinery: self.settle(AssetClass::Machinery, machinery, &mut failures)?,
            real_estate: self.settle(AssetClass::RealEstate, real_estate, &mut failures)?,
            intangibles: self.settle(AssetClass::Intangible, intangibles, &mut failures)?,
            other_assets: self.settle(AssetClass::OtherAsset, other_assets, &mut failures)?,
            failures,
        };

        info!(
            records = report.record_count(),
            skipped = report.failures.len(),
            "audit run finished"
        );
        Ok(report)
    }

    /// Apply the structural error policy to one class result
    fn settle<R, M>(
        &self,
        class: AssetClass,
        result: Result<ClassAudit<R, M>, AuditError>,
        failures: &mut Vec<ClassFailure>,
    ) -> Result<ClassAudit<R, M>, AuditError> {
        match (result, self.config.on_structural_error) {
            (Ok(audit), _) => Ok(audit),
            (Err(err), StructuralErrorPolicy::Halt) => Err(err),
            (Err(err), StructuralErrorPolicy::SkipClass) => {
                warn!(%class, error = %err, "class skipped");
                failures.push(ClassFailure {
                    class,
                    message: err.to_string(),
                });
                Ok(ClassAudit::default())
            }
        }
    }
}

fn audit_class<A: ClassAuditor>(
    auditor: &A,
    batch: &[A::Record],
    ctx: &AuditContext,
) -> Result<ClassAudit<A::Record, A::Metrics>, AuditError> {
    let audit = auditor.audit(batch, ctx)?;
    debug_assert_eq!(audit.len(), batch.len());

    let alerts = audit.alerts().count();
    info!(
        class = %auditor.class(),
        records = audit.len(),
        verdicts = auditor.produces_verdict(),
        alerts,
        coercions = audit.coercions.total(),
        "class audited"
    );
    Ok(audit)
}

fn in_run<T>(dispatch: &Dispatch, span: &Span, f: impl FnOnce() -> T) -> T {
    dispatcher::with_default(dispatch, || span.in_scope(f))
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}
