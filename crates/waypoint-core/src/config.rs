//! Centralized configuration for Waypoint.
//!
//! Fixed naming and sizing constants live on [`ArtifactConfig`]; per-run
//! settings are loaded into [`CheckpointConfig`] from a camelCase JSON file.

use crate::error::{Result, WaypointError};
use crate::metadata::atomic_read_json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Fixed artifact naming and hashing parameters.
pub struct ArtifactConfig;

impl ArtifactConfig {
    pub const METADATA_SUFFIX: &'static str = ".metadata";
    pub const QUARANTINE_SUFFIX: &'static str = ".corrupted";
    pub const TEMP_SUFFIX: &'static str = ".tmp";
    /// Bytes of the artifact prefix covered by the partial fingerprint.
    pub const FINGERPRINT_WINDOW: usize = 8 * 1024 * 1024;
    pub const METADATA_SCHEMA_VERSION: u32 = 1;
    /// Entry in the artifact header reserved for free-form string metadata.
    pub const HEADER_METADATA_KEY: &'static str = "__metadata__";
    /// Upper bound on a header, larger values are treated as corruption.
    pub const MAX_HEADER_BYTES: u64 = 100_000_000;
    pub const READ_CHUNK_SIZE: usize = 8 * 1024 * 1024;
}

/// Defaults for [`CheckpointConfig`].
pub struct ResolverDefaults;

impl ResolverDefaults {
    pub const MIN_VALID_SIZE_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB
    pub const POLL_INTERVAL_SECS: u64 = 10;
    pub const BEST_MARKER_NAME: &'static str = "model_best";
    pub const LAST_MARKER_NAME: &'static str = "model_last";
    pub const NUMBERED_ARTIFACT_PATTERN: &'static str = r"^model_(\d+)$";
    pub const ESSENTIAL_KEYS: &'static [&'static str] = &["model", "vocab"];
}

fn default_min_valid_size_bytes() -> u64 {
    ResolverDefaults::MIN_VALID_SIZE_BYTES
}

fn default_poll_interval_seconds() -> u64 {
    ResolverDefaults::POLL_INTERVAL_SECS
}

fn default_best_marker_name() -> String {
    ResolverDefaults::BEST_MARKER_NAME.to_string()
}

fn default_last_marker_name() -> String {
    ResolverDefaults::LAST_MARKER_NAME.to_string()
}

fn default_numbered_artifact_pattern() -> String {
    ResolverDefaults::NUMBERED_ARTIFACT_PATTERN.to_string()
}

fn default_essential_keys() -> Vec<String> {
    ResolverDefaults::ESSENTIAL_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

/// Settings for checkpoint resolution, validation and monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointConfig {
    /// Path that takes priority over everything else.
    #[serde(default)]
    pub explicit_checkpoint_path: Option<PathBuf>,
    /// Artifact name resolved relative to the output directory.
    #[serde(default)]
    pub named_checkpoint: Option<String>,
    /// Directory the training run writes its artifacts into.
    pub output_directory: PathBuf,
    /// Externally supplied artifact used to fine-tune from.
    #[serde(default)]
    pub pretrained_reference: Option<PathBuf>,
    /// Locator handed to the remote locator as the last resort.
    #[serde(default)]
    pub remote_locator: Option<String>,
    /// Directory consulted by the default download-cache locator.
    #[serde(default)]
    pub download_cache_dir: Option<PathBuf>,
    #[serde(default = "default_min_valid_size_bytes")]
    pub min_valid_size_bytes: u64,
    #[serde(default = "default_essential_keys")]
    pub essential_keys: Vec<String>,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_best_marker_name")]
    pub best_marker_name: String,
    #[serde(default = "default_last_marker_name")]
    pub last_marker_name: String,
    /// Filename regex with exactly one capture group holding the counter.
    #[serde(default = "default_numbered_artifact_pattern")]
    pub numbered_artifact_pattern: String,
}

impl CheckpointConfig {
    /// Create a configuration with defaults for everything but the output directory.
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            explicit_checkpoint_path: None,
            named_checkpoint: None,
            output_directory: output_directory.into(),
            pretrained_reference: None,
            remote_locator: None,
            download_cache_dir: None,
            min_valid_size_bytes: default_min_valid_size_bytes(),
            essential_keys: default_essential_keys(),
            poll_interval_seconds: default_poll_interval_seconds(),
            best_marker_name: default_best_marker_name(),
            last_marker_name: default_last_marker_name(),
            numbered_artifact_pattern: default_numbered_artifact_pattern(),
        }
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading checkpoint config from {}", path.display());

        let config: Self = atomic_read_json(path)?
            .ok_or_else(|| WaypointError::FileNotFound(path.to_path_buf()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make resolution meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.output_directory.as_os_str().is_empty() {
            return Err(WaypointError::config("outputDirectory must not be empty"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(WaypointError::config(
                "pollIntervalSeconds must be greater than zero",
            ));
        }
        if self.essential_keys.is_empty() {
            return Err(WaypointError::config("essentialKeys must not be empty"));
        }
        for name in [&self.best_marker_name, &self.last_marker_name] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(WaypointError::config(format!(
                    "marker name {:?} must be a plain file name",
                    name
                )));
            }
        }
        self.numbered_pattern()?;
        Ok(())
    }

    /// Compile the numbered artifact pattern.
    pub fn numbered_pattern(&self) -> Result<Regex> {
        let regex = Regex::new(&self.numbered_artifact_pattern).map_err(|e| {
            WaypointError::InvalidPattern {
                pattern: self.numbered_artifact_pattern.clone(),
                message: e.to_string(),
            }
        })?;

        // captures_len counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(WaypointError::InvalidPattern {
                pattern: self.numbered_artifact_pattern.clone(),
                message: "expected exactly one capture group for the counter".to_string(),
            });
        }
        Ok(regex)
    }

    /// Create the output directory if needed.
    pub fn ensure_output_directory(&self) -> Result<()> {
        let dir = &self.output_directory;
        if dir.exists() {
            if !dir.is_dir() {
                return Err(WaypointError::config(format!(
                    "outputDirectory {} exists and is not a directory",
                    dir.display()
                )));
            }
            return Ok(());
        }

        std::fs::create_dir_all(dir).map_err(|e| {
            WaypointError::config(format!(
                "cannot create outputDirectory {}: {}",
                dir.display(),
                e
            ))
        })?;
        info!("Created output directory {}", dir.display());
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn best_marker_path(&self) -> PathBuf {
        self.output_directory.join(&self.best_marker_name)
    }

    pub fn last_marker_path(&self) -> PathBuf {
        self.output_directory.join(&self.last_marker_name)
    }

    pub fn named_checkpoint_path(&self) -> Option<PathBuf> {
        self.named_checkpoint
            .as_ref()
            .map(|name| self.output_directory.join(name))
    }
}
