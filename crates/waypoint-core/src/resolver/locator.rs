//! Remote download locators.
//!
//! The resolver's last-resort candidate is an opaque locator string (a URL,
//! a registry id). Turning it into a local file is delegated to a
//! [`RemoteLocator`]; this crate never manages remote storage itself.

use crate::error::{Result, WaypointError};
use std::path::PathBuf;
use tracing::debug;

/// Materializes a remote locator as a local artifact path.
pub trait RemoteLocator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolve `locator` to a local file.
    ///
    /// `Ok(None)` means the artifact is not available; errors are treated
    /// the same way by the resolver but logged with their cause.
    fn fetch(&self, locator: &str) -> Result<Option<PathBuf>>;
}

/// Locator used when nothing is configured; never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteLocator;

impl RemoteLocator for NoRemoteLocator {
    fn name(&self) -> &str {
        "none"
    }

    fn fetch(&self, _locator: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Looks a locator up in a local download cache directory.
///
/// The file name is the locator's last path segment with any query string
/// or fragment removed, so `https://host/runs/tts/model_best?rev=2` maps to
/// `<cache_dir>/model_best`.
#[derive(Debug, Clone)]
pub struct CacheDirLocator {
    cache_dir: PathBuf,
}

impl CacheDirLocator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// File name a locator is cached under, if it has one.
    pub fn cache_file_name(locator: &str) -> Option<&str> {
        let trimmed = locator.split(['?', '#']).next().unwrap_or(locator);
        // Drop `scheme://host` so a bare host is never taken as a file name.
        let path = match trimmed.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
            None => trimmed,
        };
        let name = path.trim_end_matches('/').rsplit('/').next()?;
        if name.is_empty() || name == "." || name == ".." || name.contains(':') {
            None
        } else {
            Some(name)
        }
    }
}

impl RemoteLocator for CacheDirLocator {
    fn name(&self) -> &str {
        "download-cache"
    }

    fn fetch(&self, locator: &str) -> Result<Option<PathBuf>> {
        let name = Self::cache_file_name(locator).ok_or_else(|| WaypointError::Locator {
            locator: locator.to_string(),
            message: "locator has no file name".to_string(),
        })?;

        let path = self.cache_dir.join(name);
        if path.exists() {
            debug!("Found cached download for {} at {}", locator, path.display());
            Ok(Some(path))
        } else {
            debug!("No cached download for {} in {}", locator, self.cache_dir.display());
            Ok(None)
        }
    }
}
