use crate::record::AssetClass;
use thiserror::Error;

/// Errors surfaced to the caller of the audit pipeline.
///
/// Malformed values inside records are never errors: they are coerced by the
/// Metric Deriver and counted in [`crate::derive::CoercionStats`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    /// A field the class schema promises is absent on every record of the batch.
    #[error("{class} batch is missing required field '{field}' on every record")]
    MissingField {
        class: AssetClass,
        field: &'static str,
    },

    #[error("invalid configuration for '{parameter}': {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },
}

impl AuditError {
    pub fn invalid_config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> Option<AssetClass> {
        match self {
            Self::MissingField { class, .. } => Some(*class),
            Self::InvalidConfig { .. } => None,
        }
    }
}
