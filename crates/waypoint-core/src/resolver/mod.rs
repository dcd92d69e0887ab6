//! Checkpoint resolution.
//!
//! The resolver walks the candidate list strictly in priority order,
//! validating each present candidate, quarantining corrupted ones that live
//! in the output directory, and stopping at the first artifact that passes.
//! Nothing here returns an error once the resolver is built; running out of
//! candidates is a normal `None`.

mod candidates;
mod locator;

pub use candidates::{build_candidates, CandidateLocation, CandidateSource};
pub use locator::{CacheDirLocator, NoRemoteLocator, RemoteLocator};

use crate::artifact::{ArtifactInfo, ArtifactStore, CandidateKind};
use crate::config::CheckpointConfig;
use crate::error::Result;
use crate::quarantine::CorruptionHandler;
use crate::validator::{ValidationFailure, Validator};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CandidateOutcome {
    /// Nothing at the location; skipped.
    Missing { detail: Option<String> },
    /// Present but damaged.
    Corrupted {
        reason: ValidationFailure,
        quarantined: bool,
    },
    /// Present but not usable for a reason unrelated to its bytes
    /// (a directory, a permission problem).
    Unusable { reason: ValidationFailure },
    Selected,
}

impl CandidateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateOutcome::Missing { .. } => "missing",
            CandidateOutcome::Corrupted { .. } => "corrupted",
            CandidateOutcome::Unusable { .. } => "unusable",
            CandidateOutcome::Selected => "selected",
        }
    }
}

/// Trace entry for one evaluated candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDecision {
    pub kind: CandidateKind,
    pub locator: String,
    /// Local path evaluated, when one was known.
    pub path: Option<PathBuf>,
    pub required: bool,
    pub outcome: CandidateOutcome,
}

/// Selected artifact plus the full decision trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub selected: Option<ArtifactInfo>,
    pub decisions: Vec<CandidateDecision>,
}

/// Resolves which checkpoint to load for a configuration.
pub struct Resolver {
    config: CheckpointConfig,
    store: ArtifactStore,
    validator: Validator,
    handler: CorruptionHandler,
    numbered_pattern: Regex,
    remote: Arc<dyn RemoteLocator>,
}

impl Resolver {
    /// Build a resolver, rejecting invalid configuration up front.
    ///
    /// The remote locator defaults to a download-cache lookup when
    /// `downloadCacheDir` is set, and to no remote lookup otherwise.
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        config.validate()?;
        let numbered_pattern = config.numbered_pattern()?;
        let remote: Arc<dyn RemoteLocator> = match &config.download_cache_dir {
            Some(dir) => Arc::new(CacheDirLocator::new(dir)),
            None => Arc::new(NoRemoteLocator),
        };

        Ok(Self {
            store: ArtifactStore::new(&config.output_directory),
            validator: Validator::from_config(&config),
            handler: CorruptionHandler::new(),
            numbered_pattern,
            remote,
            config,
        })
    }

    /// Replace the remote locator.
    pub fn with_remote_locator(mut self, remote: Arc<dyn RemoteLocator>) -> Self {
        self.remote = remote;
        self
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// The ordered candidate list for the current directory contents.
    pub fn candidates(&self) -> Vec<CandidateSource> {
        build_candidates(&self.config, &self.store, &self.numbered_pattern)
    }

    /// Return the first valid artifact, or `None` if every candidate fails.
    pub fn resolve(&self) -> Option<ArtifactInfo> {
        self.resolve_verbose().selected
    }

    /// Resolve and return the decision trace for every evaluated candidate.
    pub fn resolve_verbose(&self) -> Resolution {
        let candidates = self.candidates();
        debug!("Evaluating {} checkpoint candidates", candidates.len());

        let mut decisions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let (decision, selected) = self.evaluate(&candidate);
            log_decision(&decision);
            decisions.push(decision);

            if let Some(info) = selected {
                return Resolution {
                    selected: Some(info),
                    decisions,
                };
            }
        }

        info!("No usable checkpoint found");
        Resolution {
            selected: None,
            decisions,
        }
    }

    fn evaluate(&self, candidate: &CandidateSource) -> (CandidateDecision, Option<ArtifactInfo>) {
        let mut decision = CandidateDecision {
            kind: candidate.kind,
            locator: candidate.locator(),
            path: None,
            required: candidate.required,
            outcome: CandidateOutcome::Missing { detail: None },
        };

        let path = match &candidate.location {
            CandidateLocation::Path(path) => path.clone(),
            CandidateLocation::Remote(locator) => match self.remote.fetch(locator) {
                Ok(Some(path)) => path,
                Ok(None) => {
                    decision.outcome = CandidateOutcome::Missing {
                        detail: Some(format!("not available via {}", self.remote.name())),
                    };
                    return (decision, None);
                }
                Err(e) => {
                    decision.outcome = CandidateOutcome::Missing {
                        detail: Some(e.to_string()),
                    };
                    return (decision, None);
                }
            },
        };
        decision.path = Some(path.clone());

        let report = self.validator.validate(&path);
        let reason = match report.reason {
            None => {
                debug!(
                    kind = %candidate.kind,
                    path = %path.display(),
                    outcome = "found",
                    "Checkpoint candidate present"
                );
                decision.outcome = CandidateOutcome::Selected;
                return (decision, Some(report.info.with_source(candidate.kind)));
            }
            Some(reason) => reason,
        };

        if report.info.exists {
            debug!(
                kind = %candidate.kind,
                path = %path.display(),
                outcome = "found",
                "Checkpoint candidate present"
            );
        }

        decision.outcome = match reason {
            ValidationFailure::Missing => CandidateOutcome::Missing { detail: None },
            reason if reason.is_corruption() => {
                // Only the run's own directory is ours to rename in.
                let quarantined = self.store.contains(&path) && self.handler.quarantine(&path);
                CandidateOutcome::Corrupted {
                    reason,
                    quarantined,
                }
            }
            reason => CandidateOutcome::Unusable { reason },
        };
        (decision, None)
    }
}

fn log_decision(decision: &CandidateDecision) {
    let kind = decision.kind;
    let locator = decision.locator.as_str();
    let outcome = decision.outcome.label();

    match &decision.outcome {
        CandidateOutcome::Selected => {
            info!(%kind, locator, outcome, "Selected checkpoint {}", locator)
        }
        CandidateOutcome::Missing { detail } => {
            let detail = detail.as_deref().unwrap_or("");
            if decision.required {
                warn!(%kind, locator, outcome, detail, "Configured checkpoint not found");
            } else {
                debug!(%kind, locator, outcome, detail, "Checkpoint candidate absent");
            }
        }
        CandidateOutcome::Corrupted {
            reason,
            quarantined,
        } => {
            warn!(%kind, locator, outcome, reason = %reason, quarantined, "Checkpoint candidate is corrupted")
        }
        CandidateOutcome::Unusable { reason } => {
            warn!(%kind, locator, outcome, reason = %reason, "Checkpoint candidate is unusable")
        }
    }
}
