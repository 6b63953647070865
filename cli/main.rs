#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::{ArrayView2, Axis};
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use numerai_tc::config::ScoringConfig;
use numerai_tc::contribution::TcScorer;
use numerai_tc::data::{ScoringTable, load_scoring_table};
use numerai_tc::eras::{
    EraProgressObserver, EraScore, ScoreSummary, group_by_era, summarize_models, tc_by_era,
};
use numerai_tc::neutralize::max_feature_exposure;

#[derive(Args)]
pub struct ScoreArgs {
    /// Path to a tab-separated table with target, meta_model and prediction* columns
    #[arg(value_name = "TABLE")]
    pub table: String,

    /// Scoring configuration (TOML). Without it the canonical TC settings are used
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Neutralize every prediction column against the feature* columns before scoring
    #[arg(long)]
    pub neutralize: bool,

    /// Score each era separately and report per-model era statistics
    #[arg(long)]
    pub per_era: bool,

    /// Where to write the per-model report
    #[arg(long, value_name = "PATH", default_value = "tc.tsv")]
    pub output: PathBuf,

    /// Also write the per-era TC of every model to this path
    #[arg(long, value_name = "PATH", requires = "per_era")]
    pub era_output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "numerai-tc",
    about = "True Contribution scoring for tournament predictions",
    long_about = "Scores prediction columns by the correlation of their rank-gaussianized \
                 values with realized returns orthogonalized against the meta-model."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every prediction column of a table
    #[command(about = "Compute TC for each prediction column (outputs: tc.tsv)")]
    Score(ScoreArgs),

    /// Write the default scoring configuration
    #[command(about = "Write a default scoring configuration (outputs: scoring.toml)")]
    InitConfig {
        #[arg(value_name = "PATH", default_value = "scoring.toml")]
        path: String,
    },

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Score(args)) => run_score(args),
        Some(Commands::InitConfig { path }) => run_init_config(&path),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Progress bar advanced once per scored era. Hidden when stderr is not a terminal.
struct EraProgressBar {
    bar: ProgressBar,
}

impl EraProgressBar {
    fn new(eras: u64) -> Result<Self, indicatif::style::TemplateError> {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(eras), draw_target);
        bar.set_style(
            ProgressStyle::with_template(
                "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} eras ({eta}) {msg}",
            )?
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Ok(Self { bar })
    }
}

impl EraProgressObserver for EraProgressBar {
    fn on_era_scored(&self, era: &str, rows: usize) {
        self.bar.set_message(format!("era {era} ({rows} rows)"));
        self.bar.inc(1);
    }
}

fn run_score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            println!("Loading scoring configuration from: {path}");
            ScoringConfig::load(path)?
        }
        None => ScoringConfig::default(),
    };
    log::info!(
        "rank method {}, quantile {}, meta-model basis {}",
        config.scoring.rank_method,
        config.scoring.quantile_method,
        config.scoring.meta_model_basis
    );

    println!("Loading scoring table from: {}", args.table);
    let table = load_scoring_table(&args.table, &config.columns, args.neutralize)?;
    println!(
        "Loaded {} rows with {} prediction columns and {} feature columns",
        table.n_rows(),
        table.prediction_names.len(),
        table.feature_names.len()
    );

    if args.neutralize && table.feature_names.is_empty() {
        log::warn!(
            "--neutralize was given but no columns start with '{}'; scoring raw predictions",
            config.columns.feature_prefix
        );
    }
    let features = (args.neutralize && !table.feature_names.is_empty())
        .then(|| table.features.view());
    let scorer = TcScorer::new(config.scoring);

    if args.per_era {
        let labels = table.eras.as_ref().ok_or_else(|| {
            format!(
                "--per-era requires an '{}' column in the table",
                config.columns.era
            )
        })?;
        let groups = group_by_era(labels.as_slice());
        println!("Scoring {} eras...", groups.len());

        let progress = EraProgressBar::new(groups.len() as u64)?;
        let era_scores = tc_by_era(
            &scorer,
            table.predictions.view(),
            table.meta_model.view(),
            table.target.view(),
            features,
            &groups,
            &progress,
        )?;
        progress.bar.finish_and_clear();

        let summaries = summarize_models(&era_scores, table.prediction_names.len());
        for (name, summary) in table.prediction_names.iter().zip(&summaries) {
            println!(
                "  {name}: mean TC {:.6}, sharpe {:.3}, hit rate {:.3} over {} eras",
                summary.mean, summary.sharpe, summary.hit_rate, summary.eras
            );
        }
        save_era_summary(&args.output, &table.prediction_names, &summaries)?;
        if let Some(path) = &args.era_output {
            save_era_scores(path, &table.prediction_names, &era_scores)?;
            println!("Per-era scores saved to: {}", path.display());
        }
    } else {
        let scores = match features {
            Some(features) => scorer.score_batch_neutralized(
                table.predictions.view(),
                table.meta_model.view(),
                table.target.view(),
                features,
            )?,
            None => scorer.score_batch(
                table.predictions.view(),
                table.meta_model.view(),
                table.target.view(),
            )?,
        };
        let exposures = match features {
            Some(features) => Some(max_exposures(&table, features)?),
            None => None,
        };

        for (name, tc) in table.prediction_names.iter().zip(scores.iter()) {
            println!("  {name}: TC {tc:.6}");
        }
        save_scores(
            &args.output,
            &table.prediction_names,
            &scores.to_vec(),
            exposures.as_deref(),
        )?;
    }

    println!("TC report saved to: {}", args.output.display());
    Ok(())
}

/// Largest absolute feature exposure of each raw prediction column.
fn max_exposures(
    table: &ScoringTable,
    features: ArrayView2<f64>,
) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    let exposures = table
        .predictions
        .axis_iter(Axis(1))
        .map(|column| max_feature_exposure(column, features))
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(exposures)
}

fn save_scores(
    output_path: &Path,
    names: &[String],
    scores: &[f64],
    exposures: Option<&[f64]>,
) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(output_path)?);
    if exposures.is_some() {
        writeln!(file, "model\ttc\tmax_feature_exposure")?;
    } else {
        writeln!(file, "model\ttc")?;
    }
    for (idx, (name, tc)) in names.iter().zip(scores).enumerate() {
        match exposures {
            Some(exposures) => writeln!(file, "{}\t{}\t{}", name, tc, exposures[idx])?,
            None => writeln!(file, "{name}\t{tc}")?,
        }
    }
    file.flush()
}

fn save_era_summary(
    output_path: &Path,
    names: &[String],
    summaries: &[ScoreSummary],
) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(output_path)?);
    writeln!(file, "model\teras\tmean\tstd\tsharpe\tmax_drawdown\thit_rate")?;
    for (name, summary) in names.iter().zip(summaries) {
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            name,
            summary.eras,
            summary.mean,
            summary.std,
            summary.sharpe,
            summary.max_drawdown,
            summary.hit_rate
        )?;
    }
    file.flush()
}

fn save_era_scores(
    output_path: &Path,
    names: &[String],
    era_scores: &[EraScore],
) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(output_path)?);
    writeln!(file, "era\trows\t{}", names.join("\t"))?;
    for era in era_scores {
        let scores: Vec<String> = era.scores.iter().map(|s| s.to_string()).collect();
        writeln!(file, "{}\t{}\t{}", era.era, era.rows, scores.join("\t"))?;
    }
    file.flush()
}

fn run_init_config(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        return Err(format!("Refusing to overwrite existing file '{path}'").into());
    }
    ScoringConfig::default().save(path)?;
    println!("Default scoring configuration written to: {path}");
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("NUMERAI_TC_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("numerai-tc {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
