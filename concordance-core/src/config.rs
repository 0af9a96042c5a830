//! Serializable analysis configuration.
//!
//! Parameters that used to travel as loose per-call defaults are bundled
//! into explicit structs and passed by reference. Every field has a default,
//! so a TOML file only needs to name what it overrides:
//!
//! ```toml
//! [significance]
//! trials = 250
//! rounding = "half_away_from_zero"
//!
//! [regression]
//! parallel = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default number of hypothetical Bernoulli trials behind a percentage.
pub const DEFAULT_TRIALS: u64 = 100;

/// Default number of digits after the decimal point in a rendered p-value.
pub const DEFAULT_PRECISION: usize = 7;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tie-breaking rule for percentage-to-count conversion.
///
/// Only matters when `percentage * trials / 100` lands exactly on `.5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Banker's rounding: 94.5 -> 94, 95.5 -> 96.
    #[default]
    HalfToEven,
    /// Schoolbook rounding: 94.5 -> 95, 95.5 -> 96.
    HalfAwayFromZero,
}

impl RoundingPolicy {
    pub fn round(self, value: f64) -> f64 {
        match self {
            Self::HalfToEven => value.round_ties_even(),
            Self::HalfAwayFromZero => value.round(),
        }
    }
}

/// Parameters for the binomial significance tester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    /// Hypothetical trial count a percentage stands for. Must be > 0.
    pub trials: u64,
    pub rounding: RoundingPolicy,
    /// Decimal digits in rendered p-values.
    pub precision: usize,
    /// Test pairs on the rayon pool.
    pub parallel: bool,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            rounding: RoundingPolicy::default(),
            precision: DEFAULT_PRECISION,
            parallel: true,
        }
    }
}

impl SignificanceConfig {
    pub fn with_trials(mut self, trials: u64) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Parameters for the stage-wise regression analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Analyze stages on the rayon pool.
    pub parallel: bool,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl RegressionConfig {
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Top-level configuration for a full analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub significance: SignificanceConfig,
    pub regression: RegressionConfig,
}

impl AnalysisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.significance.trials == 0 {
            return Err(ConfigError::Invalid(
                "significance.trials must be greater than 0".into(),
            ));
        }
        if self.significance.precision > 17 {
            return Err(ConfigError::Invalid(format!(
                "significance.precision {} exceeds f64 resolution (max 17)",
                self.significance.precision
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_percentage_scale() {
        let config = AnalysisConfig::default();
        assert_eq!(config.significance.trials, 100);
        assert_eq!(config.significance.precision, 7);
        assert_eq!(config.significance.rounding, RoundingPolicy::HalfToEven);
        assert!(config.significance.parallel);
        assert!(config.regression.parallel);
    }

    #[test]
    fn rounding_policies_differ_only_on_ties() {
        assert_eq!(RoundingPolicy::HalfToEven.round(94.5), 94.0);
        assert_eq!(RoundingPolicy::HalfAwayFromZero.round(94.5), 95.0);
        assert_eq!(RoundingPolicy::HalfToEven.round(95.5), 96.0);
        assert_eq!(RoundingPolicy::HalfAwayFromZero.round(95.5), 96.0);
        assert_eq!(RoundingPolicy::HalfToEven.round(94.8), 95.0);
        assert_eq!(RoundingPolicy::HalfAwayFromZero.round(94.2), 94.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [significance]
            trials = 250
            rounding = "half_away_from_zero"
            "#,
        )
        .unwrap();
        assert_eq!(config.significance.trials, 250);
        assert_eq!(
            config.significance.rounding,
            RoundingPolicy::HalfAwayFromZero
        );
        assert_eq!(config.significance.precision, 7);
        assert!(config.regression.parallel);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn zero_trials_rejected() {
        let err = AnalysisConfig::from_toml_str("[significance]\ntrials = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_rounding_rejected() {
        let err =
            AnalysisConfig::from_toml_str("[significance]\nrounding = \"up\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        std::fs::write(&path, "[regression]\nparallel = false\n").unwrap();

        let config = AnalysisConfig::from_file(&path).unwrap();
        assert!(!config.regression.parallel);
        assert!(config.significance.parallel);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
