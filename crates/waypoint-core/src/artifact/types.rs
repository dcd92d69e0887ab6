//! Shared artifact types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a candidate artifact came from, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateKind {
    ExplicitOverride,
    NamedArtifact,
    BestMarker,
    LastMarker,
    HighestNumberedArtifact,
    PretrainedReference,
    RemoteDownload,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::ExplicitOverride => "explicit_override",
            CandidateKind::NamedArtifact => "named_artifact",
            CandidateKind::BestMarker => "best_marker",
            CandidateKind::LastMarker => "last_marker",
            CandidateKind::HighestNumberedArtifact => "highest_numbered_artifact",
            CandidateKind::PretrainedReference => "pretrained_reference",
            CandidateKind::RemoteDownload => "remote_download",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of what is known about one artifact.
///
/// Built fresh on every validation; nothing in this crate caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub is_valid: bool,
    pub top_level_key_count: usize,
    pub has_essential_keys: bool,
    #[serde(default)]
    pub source_kind: Option<CandidateKind>,
}

impl ArtifactInfo {
    /// Info for a path that has not been inspected yet.
    pub fn unchecked(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            size_bytes: 0,
            is_valid: false,
            top_level_key_count: 0,
            has_essential_keys: false,
            source_kind: None,
        }
    }

    pub fn with_source(mut self, kind: CandidateKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    /// Final path component as a string.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
