//! Waypoint Core - checkpoint lifecycle management for training runs.
//!
//! This crate decides which checkpoint a training job should load, checks
//! that it is intact, quarantines broken ones, and keeps provenance sidecars
//! up to date while the job runs. It never trains anything and never looks
//! inside an artifact beyond its container header.
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_core::{AutoResumeCoordinator, BackgroundMonitor, CheckpointConfig, RunSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> waypoint_core::Result<()> {
//!     let config = CheckpointConfig::load("waypoint.json")?;
//!
//!     // Blocking: training must not start before this returns.
//!     let decision = AutoResumeCoordinator::from_config(config.clone())?.decide();
//!     println!("starting in {} mode", decision.mode);
//!
//!     let mut monitor = BackgroundMonitor::from_config(&config, RunSnapshot::default())?;
//!     monitor.start()?;
//!     // ... training loop ...
//!     monitor.stop().await;
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metadata;
pub mod monitor;
pub mod quarantine;
pub mod resolver;
pub mod validator;

// Re-export commonly used types
pub use artifact::{ArtifactInfo, ArtifactStore, CandidateKind, CheckpointNames};
pub use cancel::CancellationToken;
pub use config::{ArtifactConfig, CheckpointConfig, ResolverDefaults};
pub use coordinator::{decide, AutoResumeCoordinator, ResumeDecision, ResumeMode};
pub use error::{Result, WaypointError};
pub use metadata::{
    inspect_artifact, ArtifactReport, MetadataManager, MetadataRecord, MetadataRefresh,
    RunSnapshot,
};
pub use monitor::{BackgroundMonitor, ScanSummary};
pub use quarantine::CorruptionHandler;
pub use resolver::{
    CandidateDecision, CandidateOutcome, CandidateSource, RemoteLocator, Resolution, Resolver,
};
pub use validator::{ValidationFailure, ValidationReport, Validator};
