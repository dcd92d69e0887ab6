//! Basic usage example - resolve the checkpoint for a run directory

use waypoint_core::{AutoResumeCoordinator, CheckpointConfig, Result};

fn main() -> Result<()> {
    // Get output directory from args or use current directory
    let dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    println!("Resolving checkpoint in: {}", dir);

    let coordinator = AutoResumeCoordinator::from_config(CheckpointConfig::new(&dir))?;
    let (decision, resolution) = coordinator.decide_verbose();

    for candidate in &resolution.decisions {
        println!(
            "  - {:<28} {:<10} {}",
            candidate.kind.to_string(),
            candidate.outcome.label(),
            candidate.locator
        );
    }

    match decision.artifact {
        Some(artifact) => println!("Start mode {}: {}", decision.mode, artifact.path.display()),
        None => println!("Start mode {}: no checkpoint found", decision.mode),
    }

    Ok(())
}
