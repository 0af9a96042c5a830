//! Stage-wise regression analyzer.
//!
//! For every stage the checkpoint values (x) are regressed on the final
//! values (y) by ordinary least squares, and four agreement statistics are
//! reported: Pearson correlation, RMSE of the fit, R-squared, and the
//! absolute deviation of the fitted slope from 1 (the line of agreement).
//!
//! Every statistic is a pure function of its inputs and fails on its own:
//! a one-pair stage still reports RMSE = 0 and R-squared = 1 while its
//! correlation and slope are undefined. Stages never share state, so they
//! may be analyzed on the rayon pool without affecting result order.
//!
//! Values carry no range restriction. Sums of squares are taken over copies
//! scaled by the largest magnitude so they neither overflow nor underflow,
//! and a statistic that still cannot be represented as a finite `f64` is
//! reported as undefined, never as `Ok(NaN)`.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::config::RegressionConfig;
use crate::domain::{ObservationPair, StageBucket, StageLabel};
use crate::error::{serialize_outcome, AnalysisError, Statistic};

// ─── Linear fit ──────────────────────────────────────────────────────

/// Fitted line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn predict_all(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| self.predict(xi)).collect()
    }

    /// |slope - 1|: 0 when the fit is parallel to the line of agreement.
    pub fn slope_deviation_from_one(&self) -> f64 {
        (self.slope - 1.0).abs()
    }
}

/// Ordinary least-squares fit of `y` on `x`.
///
/// Requires at least two points and at least two distinct x values.
pub fn fit_ols(x: &[f64], y: &[f64]) -> Result<LinearFit, AnalysisError> {
    check_paired(x, y)?;
    if x.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            required: 2,
            actual: x.len(),
        });
    }
    if all_equal(x) {
        return Err(AnalysisError::undefined(
            "slope",
            "all checkpoint values are equal",
        ));
    }

    let (xs, x_scale) = rescaled(x);
    let (ys, y_scale) = rescaled(y);
    let mean_x = mean(&xs);
    let mean_y = mean(&ys);
    let (sxx, sxy) = xs
        .iter()
        .zip(&ys)
        .fold((0.0, 0.0), |(sxx, sxy), (&xi, &yi)| {
            let dx = xi - mean_x;
            (sxx + dx * dx, sxy + dx * (yi - mean_y))
        });
    if !(sxx.is_finite() && sxx > 0.0) {
        return Err(AnalysisError::undefined(
            "slope",
            "checkpoint values have no measurable spread",
        ));
    }

    // Slope and intercept of the unit-scaled data, mapped back.
    let unit_slope = sxy / sxx;
    let fit = LinearFit {
        slope: unit_slope * (y_scale / x_scale),
        intercept: y_scale * (mean_y - unit_slope * mean_x),
    };
    if fit.slope.is_finite() && fit.intercept.is_finite() {
        Ok(fit)
    } else {
        Err(AnalysisError::undefined(
            "slope",
            "fitted line is not representable as f64",
        ))
    }
}

// ─── Statistics ──────────────────────────────────────────────────────

/// Pearson product-moment correlation, clamped to [-1, 1].
///
/// Undefined for fewer than two points or when either side is constant.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Statistic {
    check_paired(x, y)?;
    if x.len() < 2 {
        return Err(AnalysisError::undefined(
            "pearson_correlation",
            "fewer than 2 pairs",
        ));
    }
    if all_equal(x) {
        return Err(AnalysisError::undefined(
            "pearson_correlation",
            "zero variance in checkpoint values",
        ));
    }
    if all_equal(y) {
        return Err(AnalysisError::undefined(
            "pearson_correlation",
            "zero variance in final values",
        ));
    }

    // r is scale invariant, so the unit-scaled copies give the same value.
    let (xs, _) = rescaled(x);
    let (ys, _) = rescaled(y);
    let mean_x = mean(&xs);
    let mean_y = mean(&ys);
    let (sxx, syy, sxy) = xs.iter().zip(&ys).fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (&xi, &yi)| {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
    });
    if !(sxx.is_finite() && sxx > 0.0 && syy.is_finite() && syy > 0.0) {
        return Err(AnalysisError::undefined(
            "pearson_correlation",
            "values have no measurable spread",
        ));
    }

    finite_or_undefined("pearson_correlation", sxy / (sxx.sqrt() * syy.sqrt()))
        .map(|r| r.clamp(-1.0, 1.0))
}

/// Root of the mean squared residual between observed and predicted values.
pub fn rmse(observed: &[f64], predicted: &[f64]) -> Statistic {
    check_paired(observed, predicted)?;
    if observed.is_empty() {
        return Err(AnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let scale = magnitude(observed.iter().chain(predicted).copied());
    let ssr = scaled_squared_residuals(observed, predicted, scale);
    finite_or_undefined("rmse", scale * (ssr / observed.len() as f64).sqrt())
}

/// Coefficient of determination: 1 - SSR / SST.
///
/// When every observed value is identical SST is zero; the statistic is then
/// 1 if the predictions are exact and undefined otherwise.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> Statistic {
    check_paired(observed, predicted)?;
    if observed.is_empty() {
        return Err(AnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    if all_equal(observed) {
        return if observed.iter().zip(predicted).all(|(o, p)| o == p) {
            Ok(1.0)
        } else {
            Err(AnalysisError::undefined(
                "r_squared",
                "final values are constant but residuals are not zero",
            ))
        };
    }

    // SSR and SST share one scale factor, which cancels in the ratio.
    let (ys, scale) = rescaled(observed);
    let mean_y = mean(&ys);
    let sst: f64 = ys.iter().map(|&y| (y - mean_y).powi(2)).sum();
    if !(sst.is_finite() && sst > 0.0) {
        return Err(AnalysisError::undefined(
            "r_squared",
            "final values have no measurable spread",
        ));
    }
    let ssr = scaled_squared_residuals(observed, predicted, scale);
    finite_or_undefined("r_squared", 1.0 - ssr / sst)
}

/// |OLS slope - 1| for the given points.
pub fn slope_deviation_from_one(x: &[f64], y: &[f64]) -> Statistic {
    fit_ols(x, y).map(|fit| fit.slope_deviation_from_one())
}

// ─── Per-stage analysis ──────────────────────────────────────────────

/// Agreement statistics for one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatistics {
    pub pair_count: usize,
    #[serde(serialize_with = "serialize_outcome")]
    pub pearson_correlation: Statistic,
    #[serde(serialize_with = "serialize_outcome")]
    pub rmse: Statistic,
    #[serde(serialize_with = "serialize_outcome")]
    pub r_squared: Statistic,
    #[serde(serialize_with = "serialize_outcome")]
    pub slope_deviation_from_1: Statistic,
    /// The fitted line, when one exists.
    pub fit: Option<LinearFit>,
}

/// Compute all statistics for one stage.
///
/// An empty stage or one with non-finite values fails as a whole; otherwise
/// each statistic carries its own outcome.
pub fn analyze_stage(bucket: &StageBucket) -> Result<StageStatistics, AnalysisError> {
    if bucket.is_empty() {
        return Err(AnalysisError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if let Some(pos) = bucket.pairs.iter().position(|p| !p.is_finite()) {
        return Err(AnalysisError::invalid(format!(
            "pair {pos} of {} has a non-finite value",
            bucket.label()
        )));
    }

    let (x, y) = bucket.split_xy();
    let pearson_correlation = pearson_correlation(&x, &y);

    if bucket.len() == 1 {
        // One point cannot be fitted: the prediction is the observation itself.
        return Ok(StageStatistics {
            pair_count: 1,
            pearson_correlation,
            rmse: rmse(&y, &y),
            r_squared: r_squared(&y, &y),
            slope_deviation_from_1: Err(AnalysisError::InsufficientData {
                required: 2,
                actual: 1,
            }),
            fit: None,
        });
    }

    let (rmse, r_squared, slope_deviation_from_1, fit) = match fit_ols(&x, &y) {
        Ok(fit) => {
            let predicted = fit.predict_all(&x);
            (
                rmse(&y, &predicted),
                r_squared(&y, &predicted),
                Ok(fit.slope_deviation_from_one()),
                Some(fit),
            )
        }
        Err(err) => (Err(err.clone()), Err(err.clone()), Err(err), None),
    };

    Ok(StageStatistics {
        pair_count: bucket.len(),
        pearson_correlation,
        rmse,
        r_squared,
        slope_deviation_from_1,
        fit,
    })
}

/// Result for one labelled stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub label: StageLabel,
    #[serde(serialize_with = "serialize_outcome")]
    pub result: Result<StageStatistics, AnalysisError>,
}

/// Results for all stages, ordered by stage index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StageAnalysis {
    stages: Vec<StageOutcome>,
}

impl StageAnalysis {
    pub fn iter(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Look up a stage by its rendered label, e.g. `"2nd CP"`.
    pub fn get(&self, label: &str) -> Option<&Result<StageStatistics, AnalysisError>> {
        self.stages
            .iter()
            .find(|s| s.label.to_string() == label)
            .map(|s| &s.result)
    }

    /// Look up a stage by its 0-based index.
    pub fn get_stage(&self, stage: usize) -> Option<&Result<StageStatistics, AnalysisError>> {
        self.stages
            .iter()
            .find(|s| s.label.stage() == stage)
            .map(|s| &s.result)
    }

    /// Keyed view: rendered label -> result, iterated in stage order.
    pub fn into_map(self) -> BTreeMap<StageLabel, Result<StageStatistics, AnalysisError>> {
        self.stages.into_iter().map(|s| (s.label, s.result)).collect()
    }
}

impl IntoIterator for StageAnalysis {
    type Item = StageOutcome;
    type IntoIter = std::vec::IntoIter<StageOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

/// Analyze every bucket independently.
///
/// Results come back sorted by stage index regardless of input or
/// completion order. Each stage index may appear at most once; a repeated
/// index fails the whole call with `InvalidInput`.
pub fn analyze_stages(
    buckets: &[StageBucket],
    config: &RegressionConfig,
) -> Result<StageAnalysis, AnalysisError> {
    let mut seen = BTreeSet::new();
    if let Some(repeated) = buckets.iter().find(|b| !seen.insert(b.stage)) {
        return Err(AnalysisError::invalid(format!(
            "stage {} supplied more than once",
            repeated.label()
        )));
    }
    Ok(analyze_distinct_stages(buckets, config))
}

/// [`analyze_stages`] for buckets already known to have distinct stages.
pub(crate) fn analyze_distinct_stages(
    buckets: &[StageBucket],
    config: &RegressionConfig,
) -> StageAnalysis {
    debug!(stages = buckets.len(), "analyzing stages");

    let run = |bucket: &StageBucket| {
        let result = analyze_stage(bucket);
        if let Err(err) = &result {
            warn!(stage = %bucket.label(), error = %err, "stage analysis failed");
        }
        StageOutcome {
            label: bucket.label(),
            result,
        }
    };

    let mut stages: Vec<StageOutcome> = if config.parallel {
        buckets.par_iter().map(run).collect()
    } else {
        buckets.iter().map(run).collect()
    };
    stages.sort_by_key(|s| s.label);

    StageAnalysis { stages }
}

/// Analyze stages given as `stage index -> [(checkpoint, final)]`.
pub fn analyze_stage_map(
    data: &BTreeMap<usize, Vec<(f64, f64)>>,
    config: &RegressionConfig,
) -> StageAnalysis {
    let buckets: Vec<StageBucket> = data
        .iter()
        .map(|(&stage, tuples)| StageBucket::from_tuples(stage, tuples))
        .collect();
    analyze_distinct_stages(&buckets, config)
}

/// Convenience for callers holding pairs rather than buckets.
pub fn analyze_pairs(stage: usize, pairs: &[ObservationPair]) -> StageOutcome {
    let bucket = StageBucket::new(stage, pairs.to_vec());
    StageOutcome {
        label: bucket.label(),
        result: analyze_stage(&bucket),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn check_paired(a: &[f64], b: &[f64]) -> Result<(), AnalysisError> {
    if a.len() != b.len() {
        return Err(AnalysisError::invalid(format!(
            "sequence lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

fn all_equal(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Mean shifted by the first element, so a constant sequence has a mean
/// exactly equal to its value.
fn mean(values: &[f64]) -> f64 {
    let Some(&first) = values.first() else {
        return f64::NAN;
    };
    first + values.iter().map(|&v| v - first).sum::<f64>() / values.len() as f64
}

/// Largest absolute value, or 1 when there is none or all are zero.
fn magnitude(values: impl Iterator<Item = f64>) -> f64 {
    let largest = values.fold(0.0_f64, |m, v| m.max(v.abs()));
    if largest > 0.0 {
        largest
    } else {
        1.0
    }
}

/// Copy of `values` divided by their magnitude, plus that magnitude.
fn rescaled(values: &[f64]) -> (Vec<f64>, f64) {
    let scale = magnitude(values.iter().copied());
    (values.iter().map(|v| v / scale).collect(), scale)
}

/// Sum of squared residuals after dividing both sides by `scale`.
fn scaled_squared_residuals(observed: &[f64], predicted: &[f64], scale: f64) -> f64 {
    observed
        .iter()
        .zip(predicted)
        .map(|(&o, &p)| (o / scale - p / scale).powi(2))
        .sum()
}

fn finite_or_undefined(statistic: &'static str, value: f64) -> Statistic {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AnalysisError::undefined(
            statistic,
            "result is not representable as f64",
        ))
    }
}
