//! Concordance Core — checkpoint/final agreement statistics.
//!
//! This crate contains the statistical engine:
//! - Domain types (observation pairs, stage buckets, ordinal stage labels)
//! - Explicit analysis configuration, loadable from TOML
//! - Log-space special functions (ln Gamma, ln C(n, k), binomial pmf)
//! - Exact two-sided binomial significance tests per checkpoint/final pair
//! - Stage-wise OLS regression: Pearson r, RMSE, R-squared, slope deviation
//! - Study trajectory bucketing and the data feed for trend-line charts
//!
//! Every entry point is a pure function. Failures are reported per pair or
//! per stage so one bad item never hides the results of the others.

pub mod binomial;
pub mod config;
pub mod domain;
pub mod error;
pub mod regression;
pub mod special;
pub mod trajectory;

pub use binomial::{
    binomial_test_two_sided, format_p_value, format_p_values, percentage_to_count,
    percentage_to_probability, test_observations, test_pair, test_pairs, SignificanceResult,
};
pub use config::{AnalysisConfig, ConfigError, RegressionConfig, RoundingPolicy, SignificanceConfig};
pub use domain::{ObservationPair, StageBucket, StageLabel};
pub use error::{AnalysisError, Statistic};
pub use regression::{
    analyze_pairs, analyze_stage, analyze_stage_map, analyze_stages, fit_ols, pearson_correlation,
    r_squared, rmse, slope_deviation_from_one, LinearFit, StageAnalysis, StageOutcome, StageStatistics,
};
pub use trajectory::{
    agreement_line, bucket_by_stage, trend_line, AgreementLine, PlotFeed, StudyTrajectory,
    TrendLine,
};
