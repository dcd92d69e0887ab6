//! Atomic file operations for sidecar persistence.
//!
//! Writes go to a sibling temp file with a unique PID+TID suffix, are fsynced,
//! and then renamed over the target. Readers never observe a half-written
//! sidecar.

use crate::config::ArtifactConfig;
use crate::{Result, WaypointError};
use serde::{de::DeserializeOwned, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path).map_err(|e| WaypointError::io_with_path(e, path))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| WaypointError::io_with_path(e, path))?;

    let data: T = serde_json::from_str(&contents).map_err(|e| WaypointError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically, replacing any previous content.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WaypointError::io_with_path(e, parent))?;
        }
    }

    let temp_path = temp_path_for(path);

    let serialized = serde_json::to_string_pretty(data).map_err(|e| WaypointError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| WaypointError::io_with_path(e, &temp_path))?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| WaypointError::io_with_path(e, &temp_path))?;
        file.flush()
            .map_err(|e| WaypointError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| WaypointError::io_with_path(e, &temp_path))?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(WaypointError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Sibling temp path: `<name>.<pid>.<tid>.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("sidecar"));
    name.push(format!(
        ".{}.{}{}",
        process::id(),
        thread_id(),
        ArtifactConfig::TEMP_SUFFIX
    ));
    path.with_file_name(name)
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
