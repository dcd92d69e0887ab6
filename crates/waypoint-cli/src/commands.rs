//! Subcommand implementations.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use waypoint_core::{
    inspect_artifact, AutoResumeCoordinator, BackgroundMonitor, CheckpointConfig, Resolver,
    RunSnapshot, Validator,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn found(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

pub fn resolve(config: CheckpointConfig, verbose: bool) -> Result<ExitCode> {
    let resolver = Resolver::new(config)?;

    if verbose {
        let resolution = resolver.resolve_verbose();
        print_json(&resolution)?;
        return Ok(found(resolution.selected.is_some()));
    }

    match resolver.resolve() {
        Some(artifact) => {
            println!("{}", artifact.path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

pub fn validate(config: &CheckpointConfig, path: &Path) -> Result<ExitCode> {
    let report = Validator::from_config(config).validate(path);
    print_json(&report)?;
    Ok(found(report.ok))
}

pub fn info(config: &CheckpointConfig, path: &Path) -> Result<ExitCode> {
    let report = inspect_artifact(&Validator::from_config(config), path);
    print_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

pub fn decide(config: CheckpointConfig) -> Result<ExitCode> {
    let decision = AutoResumeCoordinator::from_config(config)?.decide();
    print_json(&decision)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn monitor(
    config: CheckpointConfig,
    once: bool,
    run_config: Option<&Path>,
) -> Result<ExitCode> {
    let snapshot = match run_config {
        Some(path) => RunSnapshot::from_file(path)
            .with_context(|| format!("failed to read run config {}", path.display()))?,
        None => RunSnapshot::default(),
    };
    config.ensure_output_directory()?;
    let mut monitor = BackgroundMonitor::from_config(&config, snapshot)?;

    if once {
        let summary = monitor.scan_once().await?;
        print_json(&serde_json::json!({
            "scanned": summary.scanned,
            "refreshed": summary.refreshed,
            "current": summary.current,
            "failed": summary.failed,
            "removed": summary.removed,
        }))?;
        return Ok(found(summary.failed == 0));
    }

    monitor.start()?;
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping monitor");
    monitor.stop().await;
    Ok(ExitCode::SUCCESS)
}
