//! Quarantine for corrupted checkpoints.
//!
//! A bad artifact is renamed in place to `<name>.corrupted` so it drops out
//! of candidate enumeration but stays on disk for inspection. If that name is
//! already taken by an earlier quarantine, `<name>.<n>.corrupted` is used.
//! Nothing here deletes data, and quarantined files are never purged.

use crate::artifact::store::append_to_file_name;
use crate::artifact::ArtifactStore;
use crate::config::ArtifactConfig;
use crate::error::{Result, WaypointError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound on numbered quarantine names tried for one artifact.
const MAX_QUARANTINE_SLOTS: u32 = 10_000;

/// Renames artifacts that failed validation.
#[derive(Debug, Clone, Default)]
pub struct CorruptionHandler;

impl CorruptionHandler {
    pub fn new() -> Self {
        Self
    }

    /// Quarantine `path`.
    ///
    /// Returns `true` if the artifact was renamed, `false` if there was
    /// nothing to do (already quarantined, or no longer present) or the
    /// rename failed. Failures are logged, never raised, so a resolver can
    /// keep walking its candidates.
    pub fn quarantine(&self, path: &Path) -> bool {
        match self.try_quarantine(path) {
            Ok(Some(target)) => {
                warn!(
                    "Quarantined corrupted artifact {} as {}",
                    path.display(),
                    target.display()
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to quarantine {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Quarantine `path`, returning the new location if a rename happened.
    pub fn try_quarantine(&self, path: &Path) -> Result<Option<PathBuf>> {
        if ArtifactStore::is_quarantined(path) {
            debug!("{} is already quarantined", path.display());
            return Ok(None);
        }

        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {
                debug!("Refusing to quarantine directory {}", path.display());
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} no longer exists, nothing to quarantine", path.display());
                return Ok(None);
            }
            Err(e) => return Err(WaypointError::io_with_path(e, path)),
        }

        let target = Self::free_quarantine_path(path)?;
        std::fs::rename(path, &target).map_err(|e| WaypointError::io_with_path(e, path))?;
        Ok(Some(target))
    }

    /// Preferred quarantine location for `path`.
    pub fn quarantine_path(path: &Path) -> PathBuf {
        append_to_file_name(path, ArtifactConfig::QUARANTINE_SUFFIX)
    }

    fn free_quarantine_path(path: &Path) -> Result<PathBuf> {
        let preferred = Self::quarantine_path(path);
        if !preferred.exists() {
            return Ok(preferred);
        }

        for n in 1..=MAX_QUARANTINE_SLOTS {
            let candidate = append_to_file_name(
                path,
                &format!(".{}{}", n, ArtifactConfig::QUARANTINE_SUFFIX),
            );
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(WaypointError::Other(format!(
            "no free quarantine name left for {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_quarantine_renames_in_place() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_best");
        std::fs::write(&path, b"broken").unwrap();

        assert!(CorruptionHandler::new().quarantine(&path));
        assert!(!path.exists());

        let target = temp.path().join("model_best.corrupted");
        assert_eq!(std::fs::read(target).unwrap(), b"broken");
    }

    #[test]
    fn test_quarantine_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_best");
        std::fs::write(&path, b"broken").unwrap();
        let handler = CorruptionHandler::new();

        assert!(handler.quarantine(&path));
        let after_once = listing(temp.path());

        assert!(!handler.quarantine(&path));
        assert_eq!(listing(temp.path()), after_once);

        let quarantined = temp.path().join("model_best.corrupted");
        assert!(!handler.quarantine(&quarantined));
        assert_eq!(listing(temp.path()), after_once);
    }

    #[test]
    fn test_existing_quarantine_is_preserved() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model_best");
        let handler = CorruptionHandler::new();

        std::fs::write(&path, b"first").unwrap();
        assert!(handler.quarantine(&path));
        std::fs::write(&path, b"second").unwrap();
        assert!(handler.quarantine(&path));

        assert_eq!(
            listing(temp.path()),
            vec!["model_best.1.corrupted", "model_best.corrupted"]
        );
        assert_eq!(
            std::fs::read(temp.path().join("model_best.corrupted")).unwrap(),
            b"first"
        );
    }

    #[test]
    fn test_directories_are_left_alone() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("model_best");
        std::fs::create_dir(&dir).unwrap();

        assert!(!CorruptionHandler::new().quarantine(&dir));
        assert!(dir.is_dir());
    }
}
