//! Study trajectories and the plot feed.
//!
//! A study reports an initial checkpoint value, zero or more intermediate
//! checkpoint values, and one final value. Checkpoint `i` of every study is
//! paired with that study's final value and collected into stage `i`.
//!
//! The plot feed is everything a chart needs to draw the scatter, one trend
//! line per stage and the diagonal line of agreement. No rendering happens
//! here.

use serde::{Deserialize, Serialize};

use crate::config::RegressionConfig;
use crate::domain::{ObservationPair, StageBucket, StageLabel};
use crate::regression::{analyze_distinct_stages, fit_ols, LinearFit, StageAnalysis};

/// One study's outcome values over time, as percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyTrajectory {
    pub name: String,
    pub initial: f64,
    #[serde(default)]
    pub intermediates: Vec<f64>,
    pub final_value: f64,
}

impl StudyTrajectory {
    pub fn new(name: impl Into<String>, initial: f64, intermediates: Vec<f64>, final_value: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            intermediates,
            final_value,
        }
    }

    /// Checkpoint values in stage order: the initial value, then the
    /// intermediates.
    pub fn checkpoints(&self) -> Vec<f64> {
        std::iter::once(self.initial)
            .chain(self.intermediates.iter().copied())
            .collect()
    }

    /// `(checkpoint, final)` pairs, one per stage this study reaches.
    pub fn pairs(&self) -> Vec<ObservationPair> {
        self.checkpoints()
            .into_iter()
            .map(|c| ObservationPair::new(c, self.final_value))
            .collect()
    }
}

/// Group study checkpoints into stage buckets.
///
/// Stage `i` holds one pair per study that has an `i`-th checkpoint, in
/// study order. Stages are contiguous from 0 and never empty.
pub fn bucket_by_stage(studies: &[StudyTrajectory]) -> Vec<StageBucket> {
    let mut buckets: Vec<StageBucket> = Vec::new();
    for study in studies {
        for (stage, pair) in study.pairs().into_iter().enumerate() {
            if stage == buckets.len() {
                buckets.push(StageBucket::new(stage, Vec::new()));
            }
            buckets[stage].pairs.push(pair);
        }
    }
    buckets
}

// ─── Plot feed ───────────────────────────────────────────────────────

/// Fitted trend line for one stage, sampled where the chart draws it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub label: StageLabel,
    pub fit: LinearFit,
    /// `(x, fitted y)` at each distinct checkpoint value, ascending.
    pub points: Vec<(f64, f64)>,
}

/// Fit a stage's trend line. `None` when no line can be fitted.
pub fn trend_line(bucket: &StageBucket) -> Option<TrendLine> {
    let (x, y) = bucket.split_xy();
    let fit = fit_ols(&x, &y).ok()?;

    let mut xs = x;
    xs.sort_by(f64::total_cmp);
    xs.dedup();

    Some(TrendLine {
        label: bucket.label(),
        fit,
        points: xs.into_iter().map(|xi| (xi, fit.predict(xi))).collect(),
    })
}

/// The `y = x` segment drawn for reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgreementLine {
    pub start: f64,
    pub end: f64,
}

/// Line of agreement spanning the smallest checkpoint value to the largest
/// final value across all stages. `None` when there are no pairs.
pub fn agreement_line(buckets: &[StageBucket]) -> Option<AgreementLine> {
    let pairs = || buckets.iter().flat_map(|b| b.pairs.iter());
    let start = pairs().map(|p| p.checkpoint).min_by(f64::total_cmp)?;
    let end = pairs().map(|p| p.final_value).max_by(f64::total_cmp)?;
    Some(AgreementLine { start, end })
}

/// Everything a chart of the studies needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotFeed {
    pub buckets: Vec<StageBucket>,
    pub trend_lines: Vec<TrendLine>,
    pub agreement_line: Option<AgreementLine>,
}

impl PlotFeed {
    pub fn from_studies(studies: &[StudyTrajectory]) -> Self {
        let buckets = bucket_by_stage(studies);
        let trend_lines = buckets.iter().filter_map(trend_line).collect();
        let agreement_line = agreement_line(&buckets);
        Self {
            buckets,
            trend_lines,
            agreement_line,
        }
    }

    /// Run the stage-wise regression over the same buckets.
    pub fn analyze(&self, config: &RegressionConfig) -> StageAnalysis {
        // bucket_by_stage yields each stage index once.
        analyze_distinct_stages(&self.buckets, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_studies() -> Vec<StudyTrajectory> {
        vec![
            StudyTrajectory::new("Study 1", 67.0, vec![75.0], 72.2),
            StudyTrajectory::new("Study 2", 100.0, vec![67.0], 75.0),
            StudyTrajectory::new("Study 3", 38.0, vec![], 60.0),
        ]
    }

    #[test]
    fn checkpoints_start_with_initial() {
        let study = StudyTrajectory::new("s", 10.0, vec![20.0, 30.0], 40.0);
        assert_eq!(study.checkpoints(), vec![10.0, 20.0, 30.0]);
        assert!(study.pairs().iter().all(|p| p.final_value == 40.0));
    }

    #[test]
    fn buckets_follow_checkpoint_position() {
        let buckets = bucket_by_stage(&sample_studies());
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].len(), 3);
        assert_eq!(buckets[1].len(), 2);
        assert_eq!(buckets[1].stage, 1);
        assert_eq!(buckets[1].pairs[0], ObservationPair::new(75.0, 72.2));
        assert_eq!(buckets[1].pairs[1], ObservationPair::new(67.0, 75.0));
    }

    #[test]
    fn no_studies_no_buckets() {
        assert!(bucket_by_stage(&[]).is_empty());
        assert!(agreement_line(&[]).is_none());
    }

    #[test]
    fn trend_line_sampled_at_distinct_x() {
        let bucket = StageBucket::from_tuples(0, &[(3.0, 5.0), (1.0, 2.0), (3.0, 6.0), (2.0, 3.0)]);
        let line = trend_line(&bucket).unwrap();
        let xs: Vec<f64> = line.points.iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        for (x, y) in &line.points {
            assert!((line.fit.predict(*x) - y).abs() < 1e-12);
        }
    }

    #[test]
    fn trend_line_needs_a_fit() {
        assert!(trend_line(&StageBucket::from_tuples(0, &[(1.0, 2.0)])).is_none());
        assert!(trend_line(&StageBucket::from_tuples(0, &[(1.0, 2.0), (1.0, 3.0)])).is_none());
    }

    #[test]
    fn agreement_line_spans_min_checkpoint_to_max_final() {
        let buckets = bucket_by_stage(&sample_studies());
        let line = agreement_line(&buckets).unwrap();
        assert_eq!(line.start, 38.0);
        assert_eq!(line.end, 75.0);
    }

    #[test]
    fn plot_feed_for_sample_studies() {
        let feed = PlotFeed::from_studies(&sample_studies());
        assert_eq!(feed.buckets.len(), 2);
        assert_eq!(feed.trend_lines.len(), 2);
        assert_eq!(feed.trend_lines[1].label.to_string(), "2nd CP");

        let analysis = feed.analyze(&RegressionConfig::default().with_parallelism(false));
        let first = analysis.get("1st CP").unwrap().as_ref().unwrap();
        assert!((first.pearson_correlation.clone().unwrap() - 0.9270293024411517).abs() < 1e-9);
        let second = analysis.get("2nd CP").unwrap().as_ref().unwrap();
        assert!((second.pearson_correlation.clone().unwrap() + 1.0).abs() < 1e-9);
        assert!((second.slope_deviation_from_1.clone().unwrap() - 1.35).abs() < 1e-9);
    }
}
