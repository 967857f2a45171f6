//! Portfolio dashboard
//!
//! Aggregates an enriched report into the figures an auditor looks at first:
//! record counts, book totals, verdict alerts for the classes that carry one,
//! and review flags (book value mismatches, stale registrations) for the rest.

use asset_audit_core::pipeline::{Audited, ClassAudit, ClassFailure};
use asset_audit_core::{AssetClass, AuditReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class: AssetClass,
    pub records: usize,
    /// Acquisition value, cost or amount depending on the class
    pub total_value: f64,
    pub alerts: usize,
    pub statistical_outliers: usize,
    pub model_outliers: usize,
    /// Discrepancies past tolerance or stale registrations
    pub needs_review: usize,
    pub coercions: u64,
}

impl ClassSummary {
    fn from_audit<R, M>(
        class: AssetClass,
        audit: &ClassAudit<R, M>,
        value: impl Fn(&Audited<R, M>) -> f64,
    ) -> Self {
        let mut summary = Self {
            class,
            records: audit.len(),
            total_value: 0.0,
            alerts: 0,
            statistical_outliers: 0,
            model_outliers: 0,
            needs_review: 0,
            coercions: audit.coercions.total(),
        };
        for audited in &audit.records {
            summary.total_value += value(audited);
            if let Some(signals) = audited.outcome.signals() {
                summary.statistical_outliers += usize::from(signals.is_statistical_outlier);
                summary.model_outliers += usize::from(signals.is_model_outlier);
            }
            if audited.outcome.verdict().is_some_and(|v| v.is_alert()) {
                summary.alerts += 1;
            }
            if audited.outcome.discrepancy().is_some_and(|d| d.needs_review()) {
                summary.needs_review += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub reference: DateTime<Utc>,
    pub seed: u64,
    pub classes: Vec<ClassSummary>,
    pub skipped: Vec<ClassFailure>,
}

impl PortfolioSummary {
    pub fn from_report(report: &AuditReport) -> Self {
        let classes = vec![
            ClassSummary::from_audit(AssetClass::Machinery, &report.machinery, |a| {
                a.metrics.acquisition_value
            }),
            ClassSummary::from_audit(AssetClass::RealEstate, &report.real_estate, |a| {
                a.metrics.lifecycle.acquisition_value
            }),
            ClassSummary::from_audit(AssetClass::Intangible, &report.intangibles, |a| a.metrics.cost),
            ClassSummary::from_audit(AssetClass::OtherAsset, &report.other_assets, |a| {
                a.metrics.amount
            }),
        ];
        Self {
            reference: report.reference,
            seed: report.seed,
            classes,
            skipped: report.failures.clone(),
        }
    }

    pub fn class(&self, class: AssetClass) -> Option<&ClassSummary> {
        self.classes.iter().find(|c| c.class == class)
    }

    /// Consolidated value across all classes
    pub fn total_value(&self) -> f64 {
        self.classes.iter().map(|c| c.total_value).sum()
    }

    pub fn total_records(&self) -> usize {
        self.classes.iter().map(|c| c.records).sum()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║                 NON-CURRENT ASSET AUDIT                      ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Reference: {:49} ║", self.reference.to_rfc3339())?;
        writeln!(f, "║ Seed: {:54} ║", self.seed)?;
        writeln!(f, "║ Records: {:51} ║", self.total_records())?;
        writeln!(f, "║ Total value: {:47.2} ║", self.total_value())?;
        writeln!(f, "╠──────────────────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║ {:<12} {:>7} {:>16} {:>6} {:>5} {:>5} {:>5} ║",
            "class", "records", "value", "alerts", "stat", "model", "review"
        )?;
        for c in &self.classes {
            writeln!(
                f,
                "║ {:<12} {:>7} {:>16.2} {:>6} {:>5} {:>5} {:>5} ║",
                c.class.name(),
                c.records,
                c.total_value,
                c.alerts,
                c.statistical_outliers,
                c.model_outliers,
                c.needs_review
            )?;
        }
        for failure in &self.skipped {
            writeln!(f, "║ SKIPPED {:<12} {:39.39} ║", failure.class.name(), failure.message)?;
        }
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")
    }
}
