//! Error taxonomy shared by the significance tester and the stage analyzer.
//!
//! Errors are reported per item: a failing pair or stage carries its own
//! `AnalysisError` and never aborts its siblings. Only batch-shape problems
//! (mismatched lengths, empty batch, zero trials) fail a whole call.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors from the statistical engine.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    /// Malformed, out-of-range or mismatched arguments.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Fewer data points than the operation requires.
    #[error("insufficient data: {actual} point(s) < minimum {required}")]
    InsufficientData { required: usize, actual: usize },

    /// Mathematically undefined, e.g. zero variance or degenerate totals.
    #[error("{statistic} is undefined: {reason}")]
    UndefinedStatistic {
        statistic: &'static str,
        reason: &'static str,
    },
}

impl AnalysisError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn undefined(statistic: &'static str, reason: &'static str) -> Self {
        Self::UndefinedStatistic { statistic, reason }
    }
}

/// Result of a single scalar statistic.
pub type Statistic = Result<f64, AnalysisError>;

/// Serializes an outcome as its bare value, or as the tagged error when it
/// could not be computed.
pub(crate) fn serialize_outcome<T, S>(
    value: &Result<T, AnalysisError>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Ok(v) => v.serialize(serializer),
        Err(err) => err.serialize(serializer),
    }
}
