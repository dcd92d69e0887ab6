//! Provenance sidecars for checkpoint artifacts.
//!
//! Every artifact `<name>` gets a JSON sidecar `<name>.metadata` describing
//! when it was observed, its size, a prefix fingerprint, and a snapshot of
//! the run configuration that produced it. Sidecars are overwritten on
//! refresh (no history) and are never deleted, even when their artifact is.

use crate::artifact::{compute_partial_fingerprint, ArtifactInfo, ArtifactStore};
use crate::config::ArtifactConfig;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::validator::{ValidationFailure, Validator};
use crate::{Result, WaypointError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Persisted provenance record for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub artifact_name: String,
    /// When this record was generated, not the filesystem creation time.
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Artifact modification time at observation.
    pub source_modified_at: DateTime<Utc>,
    /// SHA256 of the first `fingerprint_window` bytes only.
    pub partial_fingerprint: String,
    pub fingerprint_window: u64,
    #[serde(default)]
    pub originating_config: serde_json::Value,
    #[serde(default)]
    pub training_params: serde_json::Value,
    pub schema_version: u32,
}

impl MetadataRecord {
    /// Whether this record still describes an artifact of the given state.
    pub fn matches(&self, size_bytes: u64, modified: DateTime<Utc>) -> bool {
        self.size_bytes == size_bytes && self.source_modified_at == modified
    }
}

/// Configuration and hyperparameters of the run writing the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub config: serde_json::Value,
    pub training_params: serde_json::Value,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            config: serde_json::Value::Object(Default::default()),
            training_params: serde_json::Value::Object(Default::default()),
        }
    }
}

impl RunSnapshot {
    pub fn new(config: serde_json::Value, training_params: serde_json::Value) -> Self {
        Self {
            config,
            training_params,
        }
    }

    /// Load a run configuration file.
    ///
    /// The whole document becomes the config snapshot; its `training`
    /// section, if any, doubles as the training parameters.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: serde_json::Value = atomic_read_json(path)?
            .ok_or_else(|| WaypointError::FileNotFound(path.to_path_buf()))?;
        let training_params = config
            .get("training")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        Ok(Self {
            config,
            training_params,
        })
    }
}

/// Result of [`MetadataManager::generate_or_refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRefresh {
    pub record: MetadataRecord,
    /// False when the existing sidecar was already current.
    pub written: bool,
}

/// Derives and persists sidecar records.
///
/// Writes are serialized through an internal lock; reads are lock-free
/// because sidecars are replaced atomically.
pub struct MetadataManager {
    snapshot: RunSnapshot,
    write_lock: Mutex<()>,
}

impl MetadataManager {
    pub fn new(snapshot: RunSnapshot) -> Self {
        Self {
            snapshot,
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    /// Load the sidecar for `artifact`, if one exists.
    pub fn load(artifact: &Path) -> Result<Option<MetadataRecord>> {
        let sidecar = ArtifactStore::sidecar_path(artifact);
        debug!("Loading metadata from {}", sidecar.display());
        atomic_read_json(&sidecar)
    }

    /// Write a fresh sidecar for `artifact` unless the existing one already
    /// matches the artifact's size and modification time.
    pub fn generate_or_refresh(&self, artifact: &Path) -> Result<MetadataRefresh> {
        let stat = std::fs::metadata(artifact).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WaypointError::FileNotFound(artifact.to_path_buf())
            } else {
                WaypointError::io_with_path(e, artifact)
            }
        })?;
        if !stat.is_file() {
            return Err(WaypointError::Other(format!(
                "{} is not a regular file",
                artifact.display()
            )));
        }

        let size_bytes = stat.len();
        let modified: DateTime<Utc> = stat
            .modified()
            .map_err(|e| WaypointError::io_with_path(e, artifact))?
            .into();

        match Self::load(artifact) {
            Ok(Some(existing)) if existing.matches(size_bytes, modified) => {
                debug!("Metadata for {} is current", artifact.display());
                return Ok(MetadataRefresh {
                    record: existing,
                    written: false,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Replacing unreadable metadata for {}: {}",
                artifact.display(),
                e
            ),
        }

        let partial_fingerprint = compute_partial_fingerprint(artifact)?;
        let record = MetadataRecord {
            artifact_name: artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            created_at: Utc::now(),
            size_bytes,
            source_modified_at: modified,
            partial_fingerprint,
            fingerprint_window: ArtifactConfig::FINGERPRINT_WINDOW as u64,
            originating_config: self.snapshot.config.clone(),
            training_params: self.snapshot.training_params.clone(),
            schema_version: ArtifactConfig::METADATA_SCHEMA_VERSION,
        };

        let sidecar = ArtifactStore::sidecar_path(artifact);
        {
            let _lock = self.write_lock.lock().map_err(|_| {
                WaypointError::Other("Failed to acquire write lock for metadata".to_string())
            })?;
            atomic_write_json(&sidecar, &record)?;
        }

        info!(
            "Wrote metadata for {} ({} bytes)",
            record.artifact_name, record.size_bytes
        );
        Ok(MetadataRefresh {
            record,
            written: true,
        })
    }
}

/// Everything known about one artifact: its validation state plus sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReport {
    pub info: ArtifactInfo,
    #[serde(default)]
    pub reason: Option<ValidationFailure>,
    pub sidecar_path: PathBuf,
    #[serde(default)]
    pub metadata: Option<MetadataRecord>,
    /// Set when a sidecar exists but could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_error: Option<String>,
}

/// Validate `artifact` and attach its sidecar record, if any.
///
/// Never fails: an unreadable sidecar is reported in `metadata_error`.
pub fn inspect_artifact(validator: &Validator, artifact: &Path) -> ArtifactReport {
    let report = validator.validate(artifact);
    let (metadata, metadata_error) = match MetadataManager::load(artifact) {
        Ok(record) => (record, None),
        Err(e) => (None, Some(e.to_string())),
    };

    ArtifactReport {
        info: report.info,
        reason: report.reason,
        sidecar_path: ArtifactStore::sidecar_path(artifact),
        metadata,
        metadata_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn manager() -> MetadataManager {
        MetadataManager::new(RunSnapshot::new(
            json!({"run": "tts-base", "sampleRate": 22050}),
            json!({"optimizer": "adamw", "batchSize": 16}),
        ))
    }

    fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_generate_writes_sidecar() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_00010", &[5u8; 1024]);

        let refresh = manager().generate_or_refresh(&artifact).unwrap();
        assert!(refresh.written);

        let record = &refresh.record;
        assert_eq!(record.artifact_name, "model_00010");
        assert_eq!(record.size_bytes, 1024);
        assert_eq!(record.partial_fingerprint.len(), 64);
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.training_params["batchSize"], 16);

        let sidecar = temp.path().join("model_00010.metadata");
        assert!(sidecar.exists());
        assert_eq!(MetadataManager::load(&artifact).unwrap().as_ref(), Some(record));
    }

    #[test]
    fn test_refresh_skips_unchanged() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_last", &[1u8; 64]);
        let manager = manager();

        let first = manager.generate_or_refresh(&artifact).unwrap();
        let sidecar = ArtifactStore::sidecar_path(&artifact);
        let sidecar_modified = std::fs::metadata(&sidecar).unwrap().modified().unwrap();
        let sidecar_bytes = std::fs::read(&sidecar).unwrap();

        let second = manager.generate_or_refresh(&artifact).unwrap();
        assert!(!second.written);
        assert_eq!(second.record, first.record);
        assert_eq!(
            std::fs::metadata(&sidecar).unwrap().modified().unwrap(),
            sidecar_modified
        );
        assert_eq!(std::fs::read(&sidecar).unwrap(), sidecar_bytes);
    }

    #[test]
    fn test_refresh_after_change() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_last", &[1u8; 64]);
        let manager = manager();
        let first = manager.generate_or_refresh(&artifact).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&artifact)
            .unwrap();
        file.write_all(&[2u8; 64]).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
        drop(file);

        let second = manager.generate_or_refresh(&artifact).unwrap();
        assert!(second.written);
        assert_eq!(second.record.size_bytes, 128);
        assert_ne!(
            second.record.partial_fingerprint,
            first.record.partial_fingerprint
        );
    }

    #[test]
    fn test_corrupt_sidecar_is_replaced() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_last", &[1u8; 64]);
        std::fs::write(ArtifactStore::sidecar_path(&artifact), b"not json").unwrap();

        let refresh = manager().generate_or_refresh(&artifact).unwrap();
        assert!(refresh.written);
        assert!(MetadataManager::load(&artifact).unwrap().is_some());
    }

    #[test]
    fn test_missing_artifact() {
        let temp = TempDir::new().unwrap();
        let result = manager().generate_or_refresh(&temp.path().join("gone"));
        assert!(matches!(result, Err(WaypointError::FileNotFound(_))));
    }

    #[test]
    fn test_sidecar_survives_artifact_deletion() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_00001", &[1u8; 16]);
        manager().generate_or_refresh(&artifact).unwrap();

        std::fs::remove_file(&artifact).unwrap();
        assert!(ArtifactStore::sidecar_path(&artifact).exists());
    }

    #[test]
    fn test_inspect_round_trips_record() {
        let temp = TempDir::new().unwrap();
        let artifact = write_artifact(temp.path(), "model_last", &[9u8; 32]);
        let written = manager().generate_or_refresh(&artifact).unwrap().record;

        let report = inspect_artifact(&Validator::new(0, vec!["model".into()]), &artifact);
        assert_eq!(report.metadata, Some(written));
        assert!(report.info.exists);
        assert!(!report.info.is_valid);
        assert!(report.metadata_error.is_none());
    }

    #[test]
    fn test_run_snapshot_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"model": "vits", "training": {"epochs": 1000}}"#).unwrap();

        let snapshot = RunSnapshot::from_file(&path).unwrap();
        assert_eq!(snapshot.config["model"], "vits");
        assert_eq!(snapshot.training_params, json!({"epochs": 1000}));
    }
}
