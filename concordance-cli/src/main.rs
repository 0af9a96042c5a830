//! Concordance CLI — checkpoint/final agreement reports.
//!
//! Commands:
//! - `pvalues` — exact binomial p-value for each checkpoint/final pair
//! - `stages` — stage-wise regression statistics for `x:y` pairs
//! - `trajectories` — bucket the sample studies into stages and fit trend lines
//! - `demo` — run every report on the built-in sample datasets

mod sample;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use concordance_core::{
    analyze_stage_map, test_pairs, AnalysisConfig, AnalysisError, PlotFeed, RoundingPolicy,
    SignificanceConfig, SignificanceResult, StageAnalysis, Statistic, StudyTrajectory,
};

#[derive(Parser)]
#[command(
    name = "concordance",
    about = "Concordance CLI — checkpoint vs final outcome agreement statistics"
)]
struct Cli {
    /// TOML analysis config. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a table.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exact two-sided binomial test per checkpoint/final pair.
    Pvalues {
        /// Checkpoint percentages, comma separated (e.g. 100,91,73).
        #[arg(long = "checkpoint", value_delimiter = ',', required = true, allow_hyphen_values = true)]
        checkpoint_values: Vec<f64>,

        /// Final percentages, comma separated, same length as --checkpoint.
        #[arg(long = "final", value_delimiter = ',', required = true, allow_hyphen_values = true)]
        final_values: Vec<f64>,

        /// Hypothetical trial count behind each percentage. Overrides the config.
        #[arg(long)]
        trials: Option<u64>,

        /// Tie-breaking rule for percentage-to-count rounding. Overrides the config.
        #[arg(long, value_enum)]
        rounding: Option<RoundingArg>,
    },
    /// Stage-wise regression: one --stage per stage, in order.
    Stages {
        /// Pairs for one stage as `x:y,x:y,...` (e.g. 1:2,2:3,3:5).
        #[arg(long = "stage", required = true, allow_hyphen_values = true)]
        stages: Vec<String>,
    },
    /// Bucket the sample studies by checkpoint and fit per-stage trend lines.
    Trajectories,
    /// Run every report on the built-in sample datasets.
    Demo,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoundingArg {
    HalfToEven,
    HalfAwayFromZero,
}

impl From<RoundingArg> for RoundingPolicy {
    fn from(arg: RoundingArg) -> Self {
        match arg {
            RoundingArg::HalfToEven => RoundingPolicy::HalfToEven,
            RoundingArg::HalfAwayFromZero => RoundingPolicy::HalfAwayFromZero,
        }
    }
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Pvalues {
            checkpoint_values,
            final_values,
            trials,
            rounding,
        } => {
            let mut significance = config.significance.clone();
            if let Some(trials) = trials {
                significance = significance.with_trials(trials);
            }
            if let Some(rounding) = rounding {
                significance = significance.with_rounding(rounding.into());
            }
            run_pvalues(&checkpoint_values, &final_values, &significance, cli.json)
        }
        Commands::Stages { stages } => {
            let data = stages
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    parse_stage(raw)
                        .with_context(|| format!("invalid --stage #{}: '{raw}'", i + 1))
                        .map(|pairs| (i, pairs))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            run_stages(&data, &config, cli.json)
        }
        Commands::Trajectories => run_trajectories(&sample::studies(), &config, cli.json),
        Commands::Demo => run_demo(&config, cli.json),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            let config = AnalysisConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!(path = %path.display(), "loaded analysis config");
            Ok(config)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

// ─── Commands ────────────────────────────────────────────────────────

fn run_pvalues(
    checkpoint_values: &[f64],
    final_values: &[f64],
    config: &SignificanceConfig,
    as_json: bool,
) -> Result<()> {
    let results = test_pairs(checkpoint_values, final_values, config)?;
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(
        pairs = results.len(),
        failed,
        trials = config.trials,
        "computed binomial p-values"
    );

    if as_json {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .enumerate()
            .map(|(i, r)| pvalue_json(checkpoint_values[i], final_values[i], r, config.precision))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_pvalue_table(checkpoint_values, final_values, &results, config.precision);
    }
    Ok(())
}

fn run_stages(
    data: &BTreeMap<usize, Vec<(f64, f64)>>,
    config: &AnalysisConfig,
    as_json: bool,
) -> Result<()> {
    let analysis = analyze_stage_map(data, &config.regression);
    info!(stages = analysis.len(), "computed stage statistics");

    if as_json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_stage_table(&analysis);
    }
    Ok(())
}

fn run_trajectories(
    studies: &[StudyTrajectory],
    config: &AnalysisConfig,
    as_json: bool,
) -> Result<()> {
    let feed = PlotFeed::from_studies(studies);
    let analysis = feed.analyze(&config.regression);
    info!(
        studies = studies.len(),
        stages = feed.buckets.len(),
        trend_lines = feed.trend_lines.len(),
        "built plot feed"
    );

    if as_json {
        let doc = json!({ "plot": feed, "statistics": analysis });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    for bucket in &feed.buckets {
        let points: Vec<String> = bucket
            .pairs
            .iter()
            .map(|p| format!("({}, {})", p.checkpoint, p.final_value))
            .collect();
        println!("{:<8} {}", bucket.label().to_string(), points.join(" "));
    }
    println!();
    for line in &feed.trend_lines {
        println!(
            "Trend - {:<8} y = {:.4}x + {:.4}",
            line.label.to_string(),
            line.fit.slope,
            line.fit.intercept
        );
    }
    if let Some(agreement) = feed.agreement_line {
        println!(
            "Line of agreement: ({0}, {0}) to ({1}, {1})",
            agreement.start, agreement.end
        );
    }
    println!();
    print_stage_table(&analysis);
    Ok(())
}

fn run_demo(config: &AnalysisConfig, as_json: bool) -> Result<()> {
    println!("== Binomial p-values ==");
    run_pvalues(
        &sample::CHECKPOINT_VALUES,
        &sample::FINAL_VALUES,
        &config.significance,
        as_json,
    )?;
    println!();
    println!("== Stage statistics ==");
    run_stages(&sample::stage_data(), config, as_json)?;
    println!();
    println!("== Study trajectories ==");
    run_trajectories(&sample::studies(), config, as_json)
}

// ─── Parsing ─────────────────────────────────────────────────────────

/// Parse `x:y,x:y,...` into pairs.
fn parse_stage(raw: &str) -> Result<Vec<(f64, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let Some((x, y)) = pair.split_once(':') else {
                bail!("expected x:y, got '{pair}'");
            };
            let x: f64 = x.trim().parse().with_context(|| format!("bad x in '{pair}'"))?;
            let y: f64 = y.trim().parse().with_context(|| format!("bad y in '{pair}'"))?;
            Ok((x, y))
        })
        .collect()
}

// ─── Rendering ───────────────────────────────────────────────────────

fn pvalue_json(
    checkpoint: f64,
    final_value: f64,
    result: &Result<SignificanceResult, AnalysisError>,
    precision: usize,
) -> serde_json::Value {
    match result {
        Ok(res) => json!({
            "checkpoint": checkpoint,
            "final": final_value,
            "observed_successes": res.observed_successes,
            "trials": res.trials,
            "p_value": res.formatted(precision),
        }),
        Err(err) => json!({
            "checkpoint": checkpoint,
            "final": final_value,
            "error": err,
        }),
    }
}

fn print_pvalue_table(
    checkpoint_values: &[f64],
    final_values: &[f64],
    results: &[Result<SignificanceResult, AnalysisError>],
    precision: usize,
) {
    println!("{:>4} {:>8} {:>10} {:>6} {:>12}", "#", "CP (%)", "Final (%)", "k", "P-value");
    println!("{}", "-".repeat(44));
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(res) => println!(
                "{:>4} {:>8} {:>10} {:>6} {:>12}",
                i,
                checkpoint_values[i],
                final_values[i],
                res.observed_successes,
                res.formatted(precision)
            ),
            Err(err) => println!(
                "{:>4} {:>8} {:>10} {:>6} {}",
                i, checkpoint_values[i], final_values[i], "-", err
            ),
        }
    }
}

fn print_stage_table(analysis: &StageAnalysis) {
    println!(
        "{:<8} {:>5} {:>10} {:>10} {:>10} {:>12}",
        "Stage", "Pairs", "Pearson", "RMSE", "R-squared", "|slope - 1|"
    );
    println!("{}", "-".repeat(60));
    for outcome in analysis.iter() {
        let label = outcome.label.to_string();
        match &outcome.result {
            Ok(stats) => println!(
                "{:<8} {:>5} {:>10} {:>10} {:>10} {:>12}",
                label,
                stats.pair_count,
                cell(&stats.pearson_correlation),
                cell(&stats.rmse),
                cell(&stats.r_squared),
                cell(&stats.slope_deviation_from_1)
            ),
            Err(err) => println!("{label:<8} {err}"),
        }
    }
}

fn cell(stat: &Statistic) -> String {
    match stat {
        Ok(v) => format!("{v:.4}"),
        Err(_) => "n/a".into(),
    }
}
