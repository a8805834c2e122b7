use clap::{Args, Parser, Subcommand};
use stampede_core::Stage;
use std::path::PathBuf;
use std::time::Duration;

/// A bare number is seconds (`10`, `0.5`); anything else is a humantime duration
/// (`250ms`, `1m30s`, `2h`). Shared by the command line and the YAML config.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|_| format!("invalid duration '{s}' (seconds must be non-negative and finite)"));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m30s)"))
}

/// `DURATION:TARGET`, e.g. `2m:50` ramps to 50 VUs over two minutes.
pub(crate) fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration, target) = input
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 2m:50)"))?;
    let duration = parse_duration(duration)?;
    let target: u64 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target '{target}' (expected a non-negative integer)"))?;
    Ok(Stage::new(duration, target))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a summary table.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Stage-driven load generator for the e-commerce service mesh",
    long_about = "stampede ramps a pool of virtual users through a list of stages, each running the built-in e-commerce scenario (health, users, products, orders, payments, inventory, notifications) against a base URL.\n\nMetrics are aggregated in-process and checked against pass/fail thresholds when the run ends.",
    after_help = "Examples:\n  stampede run\n  stampede run --base-url http://localhost:8080 --stage 30s:10 --stage 1m:10 --stage 30s:0\n  stampede run --config stampede.yaml --output json\n  stampede init stampede.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the load test
    #[command(
        long_about = "Run the built-in scenario through the configured stages.\n\nCLI flags override values from the config file; the config file overrides built-in defaults."
    )]
    Run(RunArgs),

    /// Write the default configuration as YAML
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Config file to create
    #[arg(default_value = "stampede.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML config file (see `stampede init`)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Base URL of the system under test
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Stage as DURATION:TARGET (repeatable). Replaces the configured stages.
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Pause between iterations of one VU (e.g. 1s, 250ms)
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// Seed for the per-VU random generators
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long in-flight iterations may run after the last stage ends
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Timeout for a single HTTP request, body read included
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
