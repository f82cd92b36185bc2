//! Command-line parsing for the keyword interest analyzer.
//!
//! Argument parsing and command dispatch stay separate from the analysis code;
//! every flag that has a config counterpart is optional here and falls back to
//! the loaded `Config`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::analysis::{AnomalyMethod, NormalizeMethod, Reducer};
use crate::config::ConfigTemplate;
use crate::domain::{ExportFormat, JsonLayout};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "trends", version, about = "Google Trends keyword interest analyzer")]
pub struct Cli {
    /// TOML configuration file (environment variables still override it).
    #[arg(long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Debug logging (overrides the configured level unless RUST_LOG is set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for exported files.
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect daily + monthly interest, rebase, add trend and anomaly columns, and export.
    Analyze(AnalyzeArgs),
    /// Rebase a daily CSV against a monthly CSV (offline).
    Rebase(RebaseArgs),
    /// Compare keywords side by side with a correlation matrix.
    Compare(CompareArgs),
    /// Print descriptive statistics for the value columns of a CSV.
    Summary(SummaryArgs),
    /// Write a configuration file template.
    InitConfig(InitConfigArgs),
}

/// Where data comes from.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Use the deterministic offline sample provider instead of SerpApi.
    #[arg(long)]
    pub sample: bool,

    /// Seed for the sample provider.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Region code (`US`, `US-CA`, `US-CA-807`); empty for worldwide.
    #[arg(long)]
    pub geo: Option<String>,
}

/// Export switches shared by commands that write files.
#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    /// Export format.
    #[arg(long, value_enum)]
    pub format: Option<ExportFormat>,

    /// JSON layout (with `--format json`).
    #[arg(long, value_enum)]
    pub json_layout: Option<JsonLayout>,

    /// Base file name (without extension); a timestamp is appended.
    #[arg(long)]
    pub name: Option<String>,

    /// Skip writing files.
    #[arg(long)]
    pub no_export: bool,

    /// Also write `{name}_summary.csv` with descriptive statistics.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Keywords; more than the batch size are split into parallel requests.
    #[arg(required = true, num_args = 1..)]
    pub keywords: Vec<String>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// First day of the analysis (default: 90 days before today).
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Last day of the analysis (default: today).
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Rolling window in rows.
    #[arg(long)]
    pub window: Option<usize>,

    #[arg(long, value_enum)]
    pub anomaly_method: Option<AnomalyMethod>,

    /// IQR multiplier or z-score cutoff.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Aggregate by these columns (e.g. `month`, `day_of_week`).
    #[arg(long, value_delimiter = ',')]
    pub group_by: Vec<String>,

    /// Reducers for aggregation (default: mean,sum,min,max,std).
    #[arg(long, value_delimiter = ',')]
    pub reducers: Vec<Reducer>,

    /// Keywords per request (provider limit applies).
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[command(flatten)]
    pub export: ExportArgs,

    /// Render an ASCII plot per keyword.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Rows of the result table to print.
    #[arg(long, default_value_t = 10)]
    pub preview: usize,

    /// Flagged anomalies to list.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Also collect related queries and topics (one extra request per keyword each).
    #[arg(long)]
    pub include_related: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RebaseArgs {
    /// Daily CSV with `date`, `year`, `month` and one column per keyword.
    #[arg(long, value_name = "CSV")]
    pub daily: PathBuf,

    /// Monthly CSV with `year`, `month` and `{keyword}_monthly` columns.
    #[arg(long, value_name = "CSV")]
    pub monthly: PathBuf,

    #[arg(required = true, num_args = 1..)]
    pub keywords: Vec<String>,

    #[command(flatten)]
    pub export: ExportArgs,

    #[arg(long, default_value_t = 10)]
    pub preview: usize,
}

#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    #[arg(required = true, num_args = 2..)]
    pub keywords: Vec<String>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Provider timeframe (default from config).
    #[arg(long)]
    pub timeframe: Option<String>,

    /// Add `{kw}_normalized` columns.
    #[arg(long, value_enum)]
    pub normalize: Option<NormalizeMethod>,

    #[command(flatten)]
    pub export: ExportArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SummaryArgs {
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Columns to describe (default: every numeric, non-period column).
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Keep rows on or after this date.
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Keep rows on or before this date.
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Keep only these keywords' value columns (`{kw}` or `{kw}_*`).
    #[arg(long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Write the statistics to `{name}_summary.csv`.
    #[arg(long)]
    pub export: bool,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InitConfigArgs {
    #[arg(long, value_enum, default_value_t = ConfigTemplate::Basic)]
    pub template: ConfigTemplate,

    /// Destination TOML file.
    #[arg(short, long, default_value = "trends.toml")]
    pub output: PathBuf,

    /// Replace an existing file.
    #[arg(long)]
    pub force: bool,
}
