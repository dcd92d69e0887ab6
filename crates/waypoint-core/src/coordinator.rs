//! Startup classification for the training loop.
//!
//! The training entry point makes one blocking call to
//! [`AutoResumeCoordinator::decide`] before it starts. The returned
//! [`ResumeMode`] tells it how much state to restore.

use crate::artifact::{ArtifactInfo, ArtifactStore};
use crate::config::CheckpointConfig;
use crate::error::Result;
use crate::resolver::{Resolution, Resolver};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// How the training loop should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumeMode {
    /// Continue this run: restore weights, optimizer, scheduler and epoch.
    Resume,
    /// Start a new run from external weights only.
    FineTune,
    /// Nothing to load.
    FreshStart,
}

impl ResumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeMode::Resume => "resume",
            ResumeMode::FineTune => "fine_tune",
            ResumeMode::FreshStart => "fresh_start",
        }
    }

    /// Whether optimizer, scheduler and epoch counter should be restored.
    pub fn restores_training_state(&self) -> bool {
        matches!(self, ResumeMode::Resume)
    }

    /// Whether model weights should be loaded at all.
    pub fn loads_weights(&self) -> bool {
        !matches!(self, ResumeMode::FreshStart)
    }
}

impl fmt::Display for ResumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of startup resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDecision {
    pub mode: ResumeMode,
    pub artifact: Option<ArtifactInfo>,
}

/// Resolves a checkpoint at startup and classifies it.
pub struct AutoResumeCoordinator {
    resolver: Resolver,
}

impl AutoResumeCoordinator {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Validate `config`, create the output directory, and build a coordinator.
    ///
    /// This is the only place a configuration problem surfaces as an error.
    pub fn from_config(config: CheckpointConfig) -> Result<Self> {
        config.validate()?;
        config.ensure_output_directory()?;
        Ok(Self::new(Resolver::new(config)?))
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve and classify.
    pub fn decide(&self) -> ResumeDecision {
        self.decide_verbose().0
    }

    /// Resolve and classify, also returning the resolver's decision trace.
    pub fn decide_verbose(&self) -> (ResumeDecision, Resolution) {
        let resolution = self.resolver.resolve_verbose();
        let decision = classify(self.resolver.store(), resolution.selected.clone());

        match &decision.artifact {
            Some(artifact) => info!(
                "Startup mode {} from {}",
                decision.mode,
                artifact.path.display()
            ),
            None => info!("Startup mode {}", decision.mode),
        }
        (decision, resolution)
    }
}

/// Validate `config`, resolve, and classify in one call.
pub fn decide(config: CheckpointConfig) -> Result<ResumeDecision> {
    Ok(AutoResumeCoordinator::from_config(config)?.decide())
}

fn classify(store: &ArtifactStore, artifact: Option<ArtifactInfo>) -> ResumeDecision {
    let mode = match &artifact {
        Some(info) if store.contains(&info.path) => ResumeMode::Resume,
        Some(_) => ResumeMode::FineTune,
        None => ResumeMode::FreshStart,
    };
    ResumeDecision { mode, artifact }
}
