//! Metadata persistence.
//!
//! This module provides:
//! - Atomic JSON file operations
//! - Sidecar provenance records for checkpoint artifacts

mod atomic;
mod manager;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use manager::{
    inspect_artifact, ArtifactReport, MetadataManager, MetadataRecord, MetadataRefresh,
    RunSnapshot,
};
