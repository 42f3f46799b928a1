//! GEOS-FP pipeline runner.
//!
//! Runs one pipeline stage over a date range or month list:
//! - `download`: retrieve raw GEOS-FP files
//! - `augment`: add the soil temperature variable to daily met files
//! - `process-month`: process whole months and fan out to output grids
//! - `run`: download, then augment
//!
//! Every unit is reported; the exit code is 0 when nothing failed, 2 when
//! some units failed and 1 when all of them did.

mod args;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use args::ScheduleArgs;
use geosfp_common::{OutputTarget, UnitSchedule};
use pipeline::{PipelineConfig, PipelineDriver, RunMode, TargetConfig};

#[derive(Parser, Debug)]
#[command(name = "geosfp-runner")]
#[command(about = "Resumable GEOS-FP retrieval and augmentation pipeline")]
struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(long, env = "GEOSFP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root of the raw download tree
    #[arg(long, env = "GEOSFP_RAW_ROOT", global = true)]
    raw_root: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download raw files for a date range or month list
    Download {
        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Add derived variables to daily met files
    Augment {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Root of the files to augment (defaults to the raw root)
        #[arg(long)]
        input_root: Option<PathBuf>,

        /// Root of the augmented files
        #[arg(long)]
        output_root: Option<PathBuf>,

        /// Rewrite outputs that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Process whole months and write every output target
    ProcessMonth {
        /// Comma-separated months (YYYYMM)
        #[arg(long, required = true)]
        months: String,

        /// Run configuration directory for the external program
        #[arg(long)]
        run_dir: Option<PathBuf>,

        /// Program run once per day, relative to the run directory
        #[arg(long)]
        program: Option<String>,

        /// Output target as LABEL=DIR or LABEL=DIR:COARSEN (repeatable)
        #[arg(long = "output")]
        outputs: Vec<OutputTarget>,

        /// Rewrite outputs that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Download, then augment
    Run {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Root of the files to augment (defaults to the raw root)
        #[arg(long)]
        input_root: Option<PathBuf>,

        /// Root of the augmented files
        #[arg(long)]
        output_root: Option<PathBuf>,
    },
}

fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if log_format.eq_ignore_ascii_case("text") {
        tracing::subscriber::set_global_default(builder.finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(raw_root) = &cli.raw_root {
        config.raw_root = raw_root.clone();
    }
    Ok(config)
}

/// Apply subcommand overrides and return the schedule and mode to run.
fn prepare(
    command: Commands,
    config: &mut PipelineConfig,
) -> Result<(UnitSchedule, RunMode)> {
    match command {
        Commands::Download { schedule } => Ok((schedule.to_schedule()?, RunMode::Fetch)),
        Commands::Augment {
            schedule,
            input_root,
            output_root,
            overwrite,
        } => {
            if input_root.is_some() {
                config.augment.input_root = input_root;
            }
            if let Some(root) = output_root {
                config.augment.output_root = root;
            }
            config.augment.overwrite |= overwrite;
            Ok((schedule.to_schedule()?, RunMode::Augment))
        }
        Commands::ProcessMonth {
            months,
            run_dir,
            program,
            outputs,
            overwrite,
        } => {
            if run_dir.is_some() {
                config.process.run_dir = run_dir;
            }
            if program.is_some() {
                config.process.program = program;
            }
            for target in outputs {
                config.process.outputs.insert(
                    target.label,
                    TargetConfig {
                        root_dir: target.root_dir,
                        coarsen: target.coarsen,
                    },
                );
            }
            config.process.overwrite |= overwrite;
            let schedule = UnitSchedule::parse_list(&months)
                .with_context(|| format!("invalid month list {}", months))?;
            Ok((schedule, RunMode::ProcessMonth))
        }
        Commands::Run {
            schedule,
            input_root,
            output_root,
        } => {
            if input_root.is_some() {
                config.augment.input_root = input_root;
            }
            if let Some(root) = output_root {
                config.augment.output_root = root;
            }
            Ok((schedule.to_schedule()?, RunMode::FetchAndAugment))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    let mut config = load_config(&cli)?;
    let report_path = cli.report.clone();
    let (schedule, mode) = prepare(cli.command, &mut config)?;
    config.validate()?;

    info!(
        mode = mode.as_str(),
        units = schedule.len(),
        raw_root = %config.raw_root.display(),
        "Starting GEOS-FP pipeline"
    );

    let driver = PipelineDriver::from_config(config).context("building pipeline")?;

    let cancel = driver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, finishing current unit");
            cancel.cancel();
        }
    });

    let report = driver.run(&schedule, mode).await?;

    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    let status = report.status();
    let rerun = report.units_to_rerun();
    if !rerun.is_empty() {
        warn!(units = %rerun.join(","), "Units needing re-run");
    }
    info!(status = ?status, cancelled = report.cancelled, "Pipeline finished");

    Ok(ExitCode::from(status.exit_code() as u8))
}
