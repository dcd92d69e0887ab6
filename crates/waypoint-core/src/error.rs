//! Error types for Waypoint.
//!
//! Validation outcomes are not errors: a corrupt or missing checkpoint is
//! reported as a [`crate::ValidationFailure`] value. The variants here cover
//! configuration problems and IO/serialization failures while writing
//! provenance sidecars.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Waypoint library.
#[derive(Debug, Error)]
pub enum WaypointError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid artifact pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    // Artifact encoding errors
    #[error("Artifact encoding failed: {message}")]
    Encoding { message: String },

    // Remote locator errors
    #[error("Remote locator {locator} failed: {message}")]
    Locator { locator: String, message: String },

    // Background task errors
    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("Monitor is already running")]
    MonitorAlreadyRunning,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Waypoint operations.
pub type Result<T> = std::result::Result<T, WaypointError>;

impl From<std::io::Error> for WaypointError {
    fn from(err: std::io::Error) -> Self {
        WaypointError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WaypointError {
    fn from(err: serde_json::Error) -> Self {
        WaypointError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WaypointError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WaypointError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        WaypointError::Config {
            message: message.into(),
        }
    }

    /// Whether this error is a startup misconfiguration.
    ///
    /// Configuration errors are the only failures allowed to halt the host
    /// process; everything else is contained by the caller.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            WaypointError::Config { .. } | WaypointError::InvalidPattern { .. }
        )
    }
}
