use anyhow::{Context, Result};
use clap::Parser;
use frametrack::cli::{Cli, Command, DemoArgs, OutputFormat, ReportArgs, TableKind};
use frametrack::config::ProfilerConfig;
use frametrack::profiler::ProfileSnapshot;
use frametrack::{csv_output, demo, json_output, text_output};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn render(snapshot: &ProfileSnapshot, format: OutputFormat, table: TableKind) -> Result<String> {
    let rendered = match (format, table) {
        (OutputFormat::Json, _) => json_output::to_json(snapshot)?,
        (OutputFormat::Csv, TableKind::Totals) => csv_output::totals_to_csv(&snapshot.totals),
        (OutputFormat::Csv, TableKind::Frames) => csv_output::frames_to_csv(&snapshot.frames),
        (OutputFormat::Text, TableKind::Totals) => text_output::render_totals(snapshot),
        (OutputFormat::Text, TableKind::Frames) => text_output::render_frames(snapshot),
    };
    Ok(rendered)
}

fn emit(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, report)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", report),
    }
    Ok(())
}

fn run_demo(args: DemoArgs) -> Result<()> {
    if args.frames == 0 {
        anyhow::bail!("Invalid value for --frames: 0 (must be >= 1)");
    }

    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProfilerConfig::default(),
    };
    if let Some(budget) = args.budget {
        config.frame_budget_ms = budget;
        config.validate()?;
    }

    let profiler = demo::run(config, args.frames)?;
    let report = render(&profiler.snapshot(), args.format, args.table)?;
    emit(&report, args.output.as_deref())
}

fn run_report(args: ReportArgs) -> Result<()> {
    if args.format == OutputFormat::Json {
        anyhow::bail!("report input is already JSON; choose --format text or --format csv");
    }
    let json = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let snapshot = json_output::from_json(&json)?;
    let report = render(&snapshot, args.format, args.table)?;
    emit(&report, None)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match args.command {
        Command::Demo(demo_args) => run_demo(demo_args),
        Command::Report(report_args) => run_report(report_args),
    }
}
