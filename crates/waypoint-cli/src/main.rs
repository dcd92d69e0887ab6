//! Waypoint CLI - checkpoint resolution from the command line.
//!
//! Wraps waypoint-core so launch scripts can ask which checkpoint a run
//! should load, check individual artifacts, and keep sidecar metadata
//! current next to a training process. Results go to stdout as JSON; logs
//! go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;
use waypoint_core::CheckpointConfig;

/// Exit code for configuration and usage problems.
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(about = "Checkpoint resolution and validation for training runs")]
struct Args {
    /// Checkpoint configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory of the run (overrides the config file)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Minimum size in bytes for a valid artifact
    #[arg(long, global = true)]
    min_size: Option<u64>,

    /// External pretrained weights to fall back to
    #[arg(long, global = true)]
    pretrained: Option<PathBuf>,

    /// Explicit checkpoint path that overrides every other candidate
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the checkpoint to load; exits 1 when none is usable
    Resolve {
        /// Print every evaluated candidate as JSON
        #[arg(short, long)]
        verbose: bool,
    },
    /// Validate one artifact; exits 1 when it is not usable, 2 on a bad config
    Validate { path: PathBuf },
    /// Show validation state and sidecar metadata for one artifact; always exits 0
    Info { path: PathBuf },
    /// Resolve and classify the startup mode
    Decide,
    /// Keep sidecar metadata current until interrupted
    Monitor {
        /// Scan once and exit
        #[arg(long)]
        once: bool,

        /// Run configuration recorded in every sidecar (JSON)
        #[arg(long)]
        run_config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = match (&args.command, build_config(&args)) {
        (_, Ok(config)) => config,
        // info is diagnostic and reports on the artifact regardless.
        (Command::Info { .. }, Err(e)) => {
            warn!("{:#}; inspecting with default settings", e);
            fallback_config(&args)
        }
        (_, Err(e)) => return Err(e),
    };

    match args.command {
        Command::Resolve { verbose } => commands::resolve(config, verbose),
        Command::Validate { path } => commands::validate(&config, &path),
        Command::Info { path } => commands::info(&config, &path),
        Command::Decide => commands::decide(config),
        Command::Monitor { once, run_config } => {
            commands::monitor(config, once, run_config.as_deref()).await
        }
    }
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<CheckpointConfig> {
    let mut config = match &args.config {
        Some(path) => CheckpointConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CheckpointConfig::new(args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))),
    };

    if let Some(dir) = &args.output_dir {
        config.output_directory = dir.clone();
    }
    if let Some(min_size) = args.min_size {
        config.min_valid_size_bytes = min_size;
    }
    if let Some(path) = &args.pretrained {
        config.pretrained_reference = Some(path.clone());
    }
    if let Some(path) = &args.checkpoint {
        config.explicit_checkpoint_path = Some(path.clone());
    }

    config.validate().context("invalid checkpoint configuration")?;
    Ok(config)
}

/// Defaults plus the size override, for when the config cannot be used.
fn fallback_config(args: &Args) -> CheckpointConfig {
    let mut config =
        CheckpointConfig::new(args.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")));
    if let Some(min_size) = args.min_size {
        config.min_valid_size_bytes = min_size;
    }
    config
}
