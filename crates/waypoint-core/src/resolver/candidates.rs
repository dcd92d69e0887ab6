//! Ordered candidate list construction.

use crate::artifact::{ArtifactStore, CandidateKind};
use crate::config::CheckpointConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a candidate's bytes are expected to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateLocation {
    Path(PathBuf),
    /// Opaque locator resolved lazily through a remote locator.
    Remote(String),
}

impl fmt::Display for CandidateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateLocation::Path(path) => write!(f, "{}", path.display()),
            CandidateLocation::Remote(locator) => write!(f, "{}", locator),
        }
    }
}

/// One entry of the priority-ordered candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSource {
    pub kind: CandidateKind,
    pub location: CandidateLocation,
    /// Explicitly configured candidates are expected to exist; their absence
    /// is logged as a warning rather than skipped silently.
    pub required: bool,
}

impl CandidateSource {
    fn path(kind: CandidateKind, path: PathBuf, required: bool) -> Self {
        Self {
            kind,
            location: CandidateLocation::Path(path),
            required,
        }
    }

    pub fn locator(&self) -> String {
        self.location.to_string()
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            CandidateLocation::Path(path) => Some(path),
            CandidateLocation::Remote(_) => None,
        }
    }
}

/// Build the candidate list for `config`.
///
/// Order: explicit override, named artifact, best marker, last marker,
/// numbered artifacts (counter descending, newest first on ties),
/// pretrained reference, remote locator. A path already listed by an earlier
/// candidate is dropped so each file is evaluated at most once.
pub fn build_candidates(
    config: &CheckpointConfig,
    store: &ArtifactStore,
    numbered_pattern: &Regex,
) -> Vec<CandidateSource> {
    let mut candidates = Vec::new();

    if let Some(path) = &config.explicit_checkpoint_path {
        candidates.push(CandidateSource::path(
            CandidateKind::ExplicitOverride,
            path.clone(),
            true,
        ));
    }
    if let Some(path) = config.named_checkpoint_path() {
        candidates.push(CandidateSource::path(CandidateKind::NamedArtifact, path, true));
    }
    candidates.push(CandidateSource::path(
        CandidateKind::BestMarker,
        config.best_marker_path(),
        false,
    ));
    candidates.push(CandidateSource::path(
        CandidateKind::LastMarker,
        config.last_marker_path(),
        false,
    ));

    if store.root().is_dir() {
        match store.numbered_artifacts(numbered_pattern) {
            Ok(numbered) => candidates.extend(numbered.into_iter().map(|n| {
                CandidateSource::path(CandidateKind::HighestNumberedArtifact, n.artifact.path, false)
            })),
            Err(e) => warn!(
                "Could not list numbered artifacts in {}: {}",
                store.root().display(),
                e
            ),
        }
    } else {
        debug!(
            "Output directory {} does not exist yet, no numbered artifacts",
            store.root().display()
        );
    }

    if let Some(path) = &config.pretrained_reference {
        candidates.push(CandidateSource::path(
            CandidateKind::PretrainedReference,
            path.clone(),
            true,
        ));
    }
    if let Some(locator) = &config.remote_locator {
        candidates.push(CandidateSource {
            kind: CandidateKind::RemoteDownload,
            location: CandidateLocation::Remote(locator.clone()),
            required: true,
        });
    }

    dedup_by_path(candidates)
}

fn dedup_by_path(candidates: Vec<CandidateSource>) -> Vec<CandidateSource> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| match candidate.local_path() {
            Some(path) => {
                let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
                let fresh = seen.insert(key);
                if !fresh {
                    debug!(
                        "Dropping duplicate {} candidate {}",
                        candidate.kind,
                        path.display()
                    );
                }
                fresh
            }
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pattern(config: &CheckpointConfig) -> Regex {
        config.numbered_pattern().unwrap()
    }

    #[test]
    fn test_full_order() {
        let temp = TempDir::new().unwrap();
        for name in ["model_00050", "model_00100", "model_best", "model_last"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }

        let mut config = CheckpointConfig::new(temp.path());
        config.explicit_checkpoint_path = Some(PathBuf::from("/elsewhere/override"));
        config.named_checkpoint = Some("model_custom".to_string());
        config.pretrained_reference = Some(PathBuf::from("/models/pretrained"));
        config.remote_locator = Some("https://host/model".to_string());

        let store = ArtifactStore::new(temp.path());
        let candidates = build_candidates(&config, &store, &pattern(&config));
        let kinds: Vec<CandidateKind> = candidates.iter().map(|c| c.kind).collect();

        assert_eq!(
            kinds,
            vec![
                CandidateKind::ExplicitOverride,
                CandidateKind::NamedArtifact,
                CandidateKind::BestMarker,
                CandidateKind::LastMarker,
                CandidateKind::HighestNumberedArtifact,
                CandidateKind::HighestNumberedArtifact,
                CandidateKind::PretrainedReference,
                CandidateKind::RemoteDownload,
            ]
        );
        assert_eq!(candidates[4].local_path(), Some(temp.path().join("model_00100").as_path()));
        assert_eq!(candidates[5].local_path(), Some(temp.path().join("model_00050").as_path()));
        assert_eq!(candidates[7].locator(), "https://host/model");
    }

    #[test]
    fn test_minimal_config() {
        let temp = TempDir::new().unwrap();
        let config = CheckpointConfig::new(temp.path().join("not-created"));
        let store = ArtifactStore::new(&config.output_directory);

        let candidates = build_candidates(&config, &store, &pattern(&config));
        let kinds: Vec<CandidateKind> = candidates.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CandidateKind::BestMarker, CandidateKind::LastMarker]);
        assert!(candidates.iter().all(|c| !c.required));
    }

    #[test]
    fn test_duplicate_paths_are_dropped() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("model_last"), b"x").unwrap();

        let mut config = CheckpointConfig::new(temp.path());
        config.explicit_checkpoint_path = Some(temp.path().join("model_last"));
        config.named_checkpoint = Some("model_last".to_string());

        let store = ArtifactStore::new(temp.path());
        let candidates = build_candidates(&config, &store, &pattern(&config));
        let kinds: Vec<CandidateKind> = candidates.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CandidateKind::ExplicitOverride, CandidateKind::BestMarker]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let temp = TempDir::new().unwrap();
        for name in ["model_3", "model_20", "model_100", "model_last"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        let config = CheckpointConfig::new(temp.path());
        let store = ArtifactStore::new(temp.path());

        let first = build_candidates(&config, &store, &pattern(&config));
        let second = build_candidates(&config, &store, &pattern(&config));
        assert_eq!(first, second);
    }
}
