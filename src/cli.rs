//! CLI argument parsing for frametrack

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text tables (default)
    Text,
    /// JSON snapshot for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

/// Which statistics a text or CSV report shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TableKind {
    /// Rolling totals per class and method
    Totals,
    /// One row per closed frame
    Frames,
}

#[derive(Parser, Debug)]
#[command(name = "frametrack")]
#[command(version)]
#[command(about = "Frame-aware execution time profiler", long_about = None)]
pub struct Cli {
    /// Enable verbose debug output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Profile a synthetic render loop and report the statistics
    Demo(DemoArgs),
    /// Reformat a JSON snapshot written by `demo --format json`
    Report(ReportArgs),
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of render frames to run
    #[arg(long, value_name = "N", default_value = "120")]
    pub frames: usize,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Statistics to show in text and CSV output
    #[arg(long = "table", value_enum, default_value = "totals")]
    pub table: TableKind,

    /// Profiler configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the frame budget in milliseconds
    #[arg(long, value_name = "MS")]
    pub budget: Option<f64>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// JSON snapshot to read
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output format (text or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Statistics to show
    #[arg(long = "table", value_enum, default_value = "totals")]
    pub table: TableKind,
}
