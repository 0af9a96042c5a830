//! Domain types: observation pairs, stage buckets and stage labels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One study arm's outcome at a checkpoint and at the final timepoint.
///
/// Both values are on the same percentage scale (0–100). The pair is
/// immutable: the engine reads it and never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationPair {
    pub checkpoint: f64,
    pub final_value: f64,
}

impl ObservationPair {
    pub fn new(checkpoint: f64, final_value: f64) -> Self {
        Self {
            checkpoint,
            final_value,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.checkpoint.is_finite() && self.final_value.is_finite()
    }
}

impl From<(f64, f64)> for ObservationPair {
    fn from((checkpoint, final_value): (f64, f64)) -> Self {
        Self::new(checkpoint, final_value)
    }
}

/// All pairs observed at the same checkpoint stage, across studies.
///
/// `stage` is 0-based: stage 0 is the first checkpoint. Pair order inside
/// the bucket does not affect any statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageBucket {
    pub stage: usize,
    pub pairs: Vec<ObservationPair>,
}

impl StageBucket {
    pub fn new(stage: usize, pairs: Vec<ObservationPair>) -> Self {
        Self { stage, pairs }
    }

    /// Build a bucket from raw `(checkpoint, final)` tuples.
    pub fn from_tuples(stage: usize, tuples: &[(f64, f64)]) -> Self {
        Self::new(stage, tuples.iter().copied().map(ObservationPair::from).collect())
    }

    pub fn label(&self) -> StageLabel {
        StageLabel::new(self.stage)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Checkpoint values (x) and final values (y) as separate sequences.
    pub fn split_xy(&self) -> (Vec<f64>, Vec<f64>) {
        self.pairs
            .iter()
            .map(|p| (p.checkpoint, p.final_value))
            .unzip()
    }
}

// ─── Stage labels ────────────────────────────────────────────────────

/// Human-readable ordinal label for a 0-based stage index: "1st CP",
/// "2nd CP", "3rd CP", "4th CP", ..., "11th CP", "21st CP".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct StageLabel {
    stage: usize,
}

impl StageLabel {
    pub fn new(stage: usize) -> Self {
        Self { stage }
    }

    /// 0-based stage index.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// 1-based ordinal position.
    pub fn ordinal(&self) -> usize {
        self.stage + 1
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.ordinal();
        write!(f, "{n}{} CP", ordinal_suffix(n))
    }
}

impl From<StageLabel> for String {
    fn from(label: StageLabel) -> Self {
        label.to_string()
    }
}

/// English ordinal suffix for a positive integer.
pub fn ordinal_suffix(n: usize) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}
