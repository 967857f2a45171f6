//! Anomaly auditing engine for non-current asset portfolios.
//!
//! Machinery, real estate, intangible and other long-term assets are audited
//! one class at a time: derived lifecycle and amortization metrics, a batch
//! z-score on acquisition value, a seeded Isolation Forest over per-class
//! features, and a class-specific verdict combining both signals.
//!
//! ```no_run
//! use asset_audit_core::{AuditConfig, AuditPipeline, Portfolio};
//!
//! let pipeline = AuditPipeline::new(AuditConfig::default())?;
//! let report = pipeline.run(&Portfolio::default())?;
//! for audited in report.machinery.alerts() {
//!     println!("{} -> {:?}", audited.record.id, audited.outcome.verdict());
//! }
//! # Ok::<(), asset_audit_core::AuditError>(())
//! ```

pub mod algo;
pub mod config;
pub mod derive;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod verdict;

pub use config::{AuditConfig, StructuralErrorPolicy};
pub use derive::{CoercionStats, Feature};
pub use error::AuditError;
pub use pipeline::{AuditContext, AuditPipeline, AuditReport, Audited, ClassAudit, ClassAuditor};
pub use record::{AssetClass, Portfolio};
pub use verdict::{AuditOutcome, Discrepancy, MachineryVerdict, RealEstateVerdict, Verdict};
