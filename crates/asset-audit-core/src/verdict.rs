//! Verdict Combiner
//!
//! Merges the statistical and model signals into one categorical result.
//! The combination differs per class: machinery uses a four-way priority
//! ladder, real estate a three-way split with a "Normal" default.
//! Intangibles and other assets get no verdict at all; their records carry
//! a [`Discrepancy`] for review instead, and [`AuditOutcome`] keeps the two
//! shapes apart so a caller cannot mistake one for the other.

use serde::{Deserialize, Serialize};

/// Both detector signals for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignals {
    pub deviation_score: f64,
    pub is_statistical_outlier: bool,
    pub is_model_outlier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineryVerdict {
    BothFlagged,
    StatisticalOnly,
    ModelOnly,
    NoAlert,
}

impl MachineryVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BothFlagged => "both flagged",
            Self::StatisticalOnly => "statistical only",
            Self::ModelOnly => "model only",
            Self::NoAlert => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealEstateVerdict {
    Both,
    StatisticalOnly,
    ModelOnly,
    Normal,
}

impl RealEstateVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::StatisticalOnly => "statistical only",
            Self::ModelOnly => "model only",
            Self::Normal => "Normal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "result", rename_all = "snake_case")]
pub enum Verdict {
    Machinery(MachineryVerdict),
    RealEstate(RealEstateVerdict),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Machinery(v) => v.label(),
            Self::RealEstate(v) => v.label(),
        }
    }

    /// True for every result except the class's "nothing found" value
    pub fn is_alert(&self) -> bool {
        !matches!(
            self,
            Self::Machinery(MachineryVerdict::NoAlert) | Self::RealEstate(RealEstateVerdict::Normal)
        )
    }
}

/// Per-class rule for turning two flags into a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationPolicy {
    /// Machinery: both > statistical > model > none, first match wins
    PriorityLadder,
    /// Real estate: both / statistical / model, otherwise Normal
    ThreeWay,
}

impl CombinationPolicy {
    pub fn combine(&self, statistical: bool, model: bool) -> Verdict {
        match self {
            Self::PriorityLadder => Verdict::Machinery(combine_machinery(statistical, model)),
            Self::ThreeWay => Verdict::RealEstate(combine_real_estate(statistical, model)),
        }
    }
}

pub fn combine_machinery(statistical: bool, model: bool) -> MachineryVerdict {
    if statistical && model {
        MachineryVerdict::BothFlagged
    } else if statistical {
        MachineryVerdict::StatisticalOnly
    } else if model {
        MachineryVerdict::ModelOnly
    } else {
        MachineryVerdict::NoAlert
    }
}

pub fn combine_real_estate(statistical: bool, model: bool) -> RealEstateVerdict {
    match (statistical, model) {
        (true, true) => RealEstateVerdict::Both,
        (true, false) => RealEstateVerdict::StatisticalOnly,
        (false, true) => RealEstateVerdict::ModelOnly,
        (false, false) => RealEstateVerdict::Normal,
    }
}

/// Review figures surfaced by classes that do not produce a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Intangibles: books versus recomputed amortization
    BookValue {
        discrepancy_vnc: f64,
        amortization_discrepancy: f64,
        exceeds_tolerance: bool,
    },
    /// Other assets: time since registration
    Aging {
        days_since_registration: i64,
        is_stale: bool,
    },
}

impl Discrepancy {
    pub fn needs_review(&self) -> bool {
        match self {
            Self::BookValue {
                exceeds_tolerance, ..
            } => *exceeds_tolerance,
            Self::Aging { is_stale, .. } => *is_stale,
        }
    }
}

/// Audit result for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    WithVerdict {
        signals: AnomalySignals,
        verdict: Verdict,
    },
    DiscrepancyOnly {
        discrepancy: Discrepancy,
    },
}

impl AuditOutcome {
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Self::WithVerdict { verdict, .. } => Some(*verdict),
            Self::DiscrepancyOnly { .. } => None,
        }
    }

    pub fn signals(&self) -> Option<&AnomalySignals> {
        match self {
            Self::WithVerdict { signals, .. } => Some(signals),
            Self::DiscrepancyOnly { .. } => None,
        }
    }

    pub fn discrepancy(&self) -> Option<&Discrepancy> {
        match self {
            Self::WithVerdict { .. } => None,
            Self::DiscrepancyOnly { discrepancy } => Some(discrepancy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machinery_truth_table() {
        let cases = [
            (true, true, MachineryVerdict::BothFlagged, "both flagged"),
            (true, false, MachineryVerdict::StatisticalOnly, "statistical only"),
            (false, true, MachineryVerdict::ModelOnly, "model only"),
            (false, false, MachineryVerdict::NoAlert, "none"),
        ];
        for (statistical, model, expected, label) in cases {
            let verdict = combine_machinery(statistical, model);
            assert_eq!(verdict, expected, "flags ({}, {})", statistical, model);
            assert_eq!(verdict.label(), label);
        }
    }

    #[test]
    fn test_real_estate_truth_table() {
        let cases = [
            (true, true, RealEstateVerdict::Both),
            (true, false, RealEstateVerdict::StatisticalOnly),
            (false, true, RealEstateVerdict::ModelOnly),
            (false, false, RealEstateVerdict::Normal),
        ];
        for (statistical, model, expected) in cases {
            assert_eq!(combine_real_estate(statistical, model), expected);
        }
        assert_eq!(RealEstateVerdict::Normal.label(), "Normal");
    }

    #[test]
    fn test_policy_dispatch_and_alerts() {
        let ladder = CombinationPolicy::PriorityLadder;
        assert_eq!(
            ladder.combine(true, true),
            Verdict::Machinery(MachineryVerdict::BothFlagged)
        );
        assert!(!ladder.combine(false, false).is_alert());
        let three_way = CombinationPolicy::ThreeWay;
        assert!(three_way.combine(false, true).is_alert());
        assert!(!three_way.combine(false, false).is_alert());
    }

    #[test]
    fn test_outcome_shapes_are_exclusive() {
        let with = AuditOutcome::WithVerdict {
            signals: AnomalySignals {
                deviation_score: 3.1,
                is_statistical_outlier: true,
                is_model_outlier: false,
            },
            verdict: Verdict::Machinery(MachineryVerdict::StatisticalOnly),
        };
        assert!(with.verdict().is_some() && with.discrepancy().is_none());

        let without = AuditOutcome::DiscrepancyOnly {
            discrepancy: Discrepancy::Aging {
                days_since_registration: 120,
                is_stale: true,
            },
        };
        assert!(without.verdict().is_none() && without.signals().is_none());
        assert!(without.discrepancy().is_some_and(|d| d.needs_review()));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = AuditOutcome::WithVerdict {
            signals: AnomalySignals {
                deviation_score: 0.0,
                is_statistical_outlier: false,
                is_model_outlier: true,
            },
            verdict: Verdict::RealEstate(RealEstateVerdict::ModelOnly),
        };
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["outcome"], "with_verdict");
        assert_eq!(json["verdict"]["class"], "real_estate");
        assert_eq!(json["verdict"]["result"], "model_only");
        let back: AuditOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
