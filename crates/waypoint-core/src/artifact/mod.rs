//! Checkpoint artifacts on disk.
//!
//! - `format`: container codec (header + data section)
//! - `store`: directory listing and naming conventions
//! - `hashing`: prefix fingerprints
//! - `types`: [`ArtifactInfo`] and [`CandidateKind`]

pub mod format;
pub mod hashing;
pub mod store;
mod types;

pub use format::{decode, write_artifact, ArtifactEntry, DecodedArtifact, FormatError};
pub use hashing::compute_partial_fingerprint;
pub use store::{ArtifactStore, CheckpointNames, NumberedArtifact, StoredArtifact};
pub use types::{ArtifactInfo, CandidateKind};
