//! Filesystem view over a checkpoint output directory.
//!
//! The store only knows naming conventions: which files are primary
//! artifacts, where their sidecars and quarantine names live, and how to
//! list them. It makes no judgement about artifact contents.

use crate::config::{ArtifactConfig, CheckpointConfig};
use crate::error::{Result, WaypointError};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A primary artifact observed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// A numbered artifact and its parsed counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedArtifact {
    pub counter: u64,
    pub artifact: StoredArtifact,
}

/// File names a run writes checkpoints under.
///
/// Logs, configs and event files share the output directory; only names
/// matched here are treated as checkpoints by the monitor.
#[derive(Debug, Clone)]
pub struct CheckpointNames {
    fixed: HashSet<String>,
    numbered: Regex,
}

impl CheckpointNames {
    pub fn new(fixed: impl IntoIterator<Item = String>, numbered: Regex) -> Self {
        Self {
            fixed: fixed.into_iter().collect(),
            numbered,
        }
    }

    /// Best and last markers, the named checkpoint, and the numbered pattern.
    pub fn from_config(config: &CheckpointConfig) -> Result<Self> {
        let fixed = [
            Some(config.best_marker_name.clone()),
            Some(config.last_marker_name.clone()),
            config.named_checkpoint.clone(),
        ];
        Ok(Self::new(
            fixed.into_iter().flatten(),
            config.numbered_pattern()?,
        ))
    }

    pub fn matches(&self, name: &str) -> bool {
        ArtifactStore::is_artifact_name(name)
            && (self.fixed.contains(name) || self.numbered.is_match(name))
    }
}

/// Directory of checkpoint artifacts and their sidecar files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sidecar metadata path for an artifact: `<artifact>.metadata`.
    pub fn sidecar_path(artifact: &Path) -> PathBuf {
        append_to_file_name(artifact, ArtifactConfig::METADATA_SUFFIX)
    }

    /// Whether a file name denotes a primary artifact rather than a sidecar,
    /// quarantined artifact, temp file or hidden file.
    pub fn is_artifact_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('.')
            && !name.ends_with(ArtifactConfig::METADATA_SUFFIX)
            && !name.ends_with(ArtifactConfig::QUARANTINE_SUFFIX)
            && !name.ends_with(ArtifactConfig::TEMP_SUFFIX)
    }

    pub fn is_quarantined(path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().ends_with(ArtifactConfig::QUARANTINE_SUFFIX))
            .unwrap_or(false)
    }

    /// Stat a single path. Returns `None` when it does not exist.
    pub fn stat(&self, path: &Path) -> Result<Option<StoredArtifact>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WaypointError::io_with_path(e, path)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| WaypointError::io_with_path(e, path))?;

        Ok(Some(StoredArtifact {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size_bytes: metadata.len(),
            modified,
        }))
    }

    /// List primary artifacts directly inside the root, sorted by name.
    ///
    /// Entries that vanish between listing and stat are skipped; the
    /// directory is written concurrently by the training loop.
    pub fn list_artifacts(&self) -> Result<Vec<StoredArtifact>> {
        if !self.root.is_dir() {
            return Err(WaypointError::NotADirectory(self.root.clone()));
        }

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !Self::is_artifact_name(&name) {
                continue;
            }
            match self.stat(entry.path()) {
                Ok(Some(artifact)) => artifacts.push(artifact),
                Ok(None) => debug!("{} disappeared while listing", entry.path().display()),
                Err(e) => warn!("Failed to stat {}: {}", entry.path().display(), e),
            }
        }
        Ok(artifacts)
    }

    /// Primary artifacts whose names are checkpoint names, sorted by name.
    pub fn list_checkpoints(&self, names: &CheckpointNames) -> Result<Vec<StoredArtifact>> {
        Ok(self
            .list_artifacts()?
            .into_iter()
            .filter(|artifact| names.matches(&artifact.name))
            .collect())
    }

    /// Artifacts whose name matches `pattern`, highest counter first.
    ///
    /// Equal counters are ordered by most recent modification time, then by
    /// name so the order is total.
    pub fn numbered_artifacts(&self, pattern: &Regex) -> Result<Vec<NumberedArtifact>> {
        let mut numbered: Vec<NumberedArtifact> = self
            .list_artifacts()?
            .into_iter()
            .filter_map(|artifact| {
                let counter = pattern
                    .captures(&artifact.name)?
                    .get(1)?
                    .as_str()
                    .parse::<u64>()
                    .ok()?;
                Some(NumberedArtifact { counter, artifact })
            })
            .collect();

        numbered.sort_by(|a, b| match b.counter.cmp(&a.counter) {
            Ordering::Equal => b
                .artifact
                .modified
                .cmp(&a.artifact.modified)
                .then_with(|| a.artifact.name.cmp(&b.artifact.name)),
            other => other,
        });
        Ok(numbered)
    }

    /// Whether `path` lies inside this store's root.
    ///
    /// Both sides are canonicalized when possible so symlinked or relative
    /// paths compare correctly.
    pub fn contains(&self, path: &Path) -> bool {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let candidate = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        candidate.starts_with(&root)
    }
}

/// `path` with `suffix` appended to its final component.
pub(crate) fn append_to_file_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
