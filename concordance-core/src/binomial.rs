//! Binomial significance tester.
//!
//! For each checkpoint/final pair the checkpoint percentage is turned into an
//! observed success count out of `trials`, the final percentage into a
//! reference probability, and an exact two-sided binomial test asks how
//! surprising that count is under Binomial(trials, p).
//!
//! The two-sided p-value is the total mass of every count whose probability
//! is no larger than that of the observed count (within a relative tolerance
//! of 1e-7), not a doubled single tail. Masses are evaluated in log space
//! (see [`crate::special`]), and the sum is taken from whichever side avoids
//! cancellation: `1 - excluded` while the excluded mass is small, the
//! included mass directly otherwise.
//!
//! Numeric results and their fixed-precision rendering are separate steps:
//! [`test_pairs`] returns numbers, [`format_p_values`] renders them.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{RoundingPolicy, SignificanceConfig};
use crate::domain::ObservationPair;
use crate::error::AnalysisError;
use crate::special::binomial_ln_pmf;

/// Relative slack when comparing a count's mass to the observed mass.
pub const RELATIVE_TOLERANCE: f64 = 1e-7;

/// Outcome of one exact binomial test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceResult {
    pub checkpoint: f64,
    pub final_value: f64,
    /// k: checkpoint percentage converted to a success count.
    pub observed_successes: u64,
    /// n: hypothetical trial count.
    pub trials: u64,
    /// p: final percentage as a probability.
    pub reference_probability: f64,
    /// Two-sided p-value in [0, 1].
    pub p_value: f64,
}

impl SignificanceResult {
    /// The p-value rendered with `precision` digits after the decimal point.
    pub fn formatted(&self, precision: usize) -> String {
        format_p_value(self.p_value, precision)
    }
}

// ─── Conversions ─────────────────────────────────────────────────────

/// Convert a percentage into a success count out of `trials`.
///
/// The result is clamped to `[0, trials]`.
pub fn percentage_to_count(percentage: f64, trials: u64, rounding: RoundingPolicy) -> u64 {
    let n = trials as f64;
    rounding.round(percentage * n / 100.0).clamp(0.0, n) as u64
}

/// Convert a percentage into a probability.
pub fn percentage_to_probability(percentage: f64) -> f64 {
    percentage / 100.0
}

// ─── Exact test ──────────────────────────────────────────────────────

/// Exact two-sided binomial test of `successes` out of `trials` against
/// success probability `p`.
pub fn binomial_test_two_sided(successes: u64, trials: u64, p: f64) -> Result<f64, AnalysisError> {
    if trials == 0 {
        return Err(AnalysisError::invalid("trial count must be greater than 0"));
    }
    if successes > trials {
        return Err(AnalysisError::invalid(format!(
            "{successes} successes exceed {trials} trials"
        )));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(AnalysisError::invalid(format!(
            "probability {p} outside [0, 1]"
        )));
    }

    // Point masses: only one count is possible.
    if p == 0.0 {
        return Ok(if successes == 0 { 1.0 } else { 0.0 });
    }
    if p == 1.0 {
        return Ok(if successes == trials { 1.0 } else { 0.0 });
    }

    if successes as f64 == trials as f64 * p {
        return Ok(1.0);
    }

    let threshold = binomial_ln_pmf(successes, trials, p) + RELATIVE_TOLERANCE.ln_1p();

    let (included, excluded) = (0..=trials).fold((0.0_f64, 0.0_f64), |(inc, exc), j| {
        let ln_mass = binomial_ln_pmf(j, trials, p);
        if ln_mass <= threshold {
            (inc + ln_mass.exp(), exc)
        } else {
            (inc, exc + ln_mass.exp())
        }
    });

    let p_value = if excluded < 0.5 {
        1.0 - excluded
    } else {
        included
    };
    Ok(p_value.clamp(0.0, 1.0))
}

/// Test a single observation pair.
pub fn test_pair(
    pair: ObservationPair,
    config: &SignificanceConfig,
) -> Result<SignificanceResult, AnalysisError> {
    check_percentage("checkpoint", pair.checkpoint)?;
    check_percentage("final", pair.final_value)?;

    let trials = config.trials;
    let observed_successes = percentage_to_count(pair.checkpoint, trials, config.rounding);
    let reference_probability = percentage_to_probability(pair.final_value);
    let p_value = binomial_test_two_sided(observed_successes, trials, reference_probability)?;

    Ok(SignificanceResult {
        checkpoint: pair.checkpoint,
        final_value: pair.final_value,
        observed_successes,
        trials,
        reference_probability,
        p_value,
    })
}

fn check_percentage(name: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(AnalysisError::invalid(format!(
            "{name} value {value} outside [0, 100]"
        )))
    }
}

// ─── Batch entry points ──────────────────────────────────────────────

/// Test every pair in order.
///
/// The outer error covers the batch shape (empty batch, zero trials); each
/// pair then succeeds or fails on its own.
pub fn test_observations(
    pairs: &[ObservationPair],
    config: &SignificanceConfig,
) -> Result<Vec<Result<SignificanceResult, AnalysisError>>, AnalysisError> {
    if pairs.is_empty() {
        return Err(AnalysisError::invalid("no observation pairs supplied"));
    }
    if config.trials == 0 {
        return Err(AnalysisError::invalid("trial count must be greater than 0"));
    }

    debug!(
        pairs = pairs.len(),
        trials = config.trials,
        rounding = ?config.rounding,
        "running exact binomial tests"
    );

    let run = |(index, pair): (usize, &ObservationPair)| {
        let result = test_pair(*pair, config);
        if let Err(err) = &result {
            warn!(index, error = %err, "binomial test failed for pair");
        }
        result
    };

    let results: Vec<_> = if config.parallel {
        pairs.par_iter().enumerate().map(run).collect()
    } else {
        pairs.iter().enumerate().map(run).collect()
    };
    Ok(results)
}

/// Test parallel sequences of checkpoint and final percentages.
pub fn test_pairs(
    checkpoint_values: &[f64],
    final_values: &[f64],
    config: &SignificanceConfig,
) -> Result<Vec<Result<SignificanceResult, AnalysisError>>, AnalysisError> {
    let pairs = zip_pairs(checkpoint_values, final_values)?;
    test_observations(&pairs, config)
}

/// Test parallel sequences and render each p-value with
/// `config.precision` decimals, e.g. `"0.0032160"`.
pub fn format_p_values(
    checkpoint_values: &[f64],
    final_values: &[f64],
    config: &SignificanceConfig,
) -> Result<Vec<Result<String, AnalysisError>>, AnalysisError> {
    let results = test_pairs(checkpoint_values, final_values, config)?;
    Ok(results
        .into_iter()
        .map(|r| r.map(|res| res.formatted(config.precision)))
        .collect())
}

/// Render a p-value with a fixed number of decimal digits.
pub fn format_p_value(p_value: f64, precision: usize) -> String {
    format!("{p_value:.precision$}")
}

fn zip_pairs(
    checkpoint_values: &[f64],
    final_values: &[f64],
) -> Result<Vec<ObservationPair>, AnalysisError> {
    if checkpoint_values.len() != final_values.len() {
        return Err(AnalysisError::invalid(format!(
            "{} checkpoint values but {} final values",
            checkpoint_values.len(),
            final_values.len()
        )));
    }
    Ok(checkpoint_values
        .iter()
        .zip(final_values)
        .map(|(&c, &f)| ObservationPair::new(c, f))
        .collect())
}
