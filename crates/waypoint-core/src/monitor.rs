//! Background metadata monitor.
//!
//! Polls the output directory on a fixed interval while training runs and
//! refreshes sidecar metadata for every checkpoint whose `(size, modTime)`
//! changed since the last tick. Files that are not checkpoint names (logs,
//! configs, event files) are ignored. The monitor shares no state with the
//! training loop; everything goes through the filesystem.
//!
//! Failures are contained per artifact: a sidecar that cannot be written is
//! logged and retried on the next tick. Stopping cancels the loop between
//! artifacts; an in-flight generation is allowed to finish since every
//! effect is idempotent.

use crate::artifact::{ArtifactStore, CheckpointNames, StoredArtifact};
use crate::cancel::CancellationToken;
use crate::config::CheckpointConfig;
use crate::error::{Result, WaypointError};
use crate::metadata::{MetadataManager, RunSnapshot};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Last observed state of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observed {
    size_bytes: u64,
    modified: SystemTime,
}

impl From<&StoredArtifact> for Observed {
    fn from(artifact: &StoredArtifact) -> Self {
        Self {
            size_bytes: artifact.size_bytes,
            modified: artifact.modified,
        }
    }
}

type LastSeen = Arc<Mutex<HashMap<PathBuf, Observed>>>;

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Artifacts present in the directory.
    pub scanned: usize,
    /// New or changed artifacts whose sidecar was written.
    pub refreshed: usize,
    /// New or changed artifacts whose sidecar was already current.
    pub current: usize,
    /// Artifacts whose metadata failed; retried next tick.
    pub failed: usize,
    /// Artifacts that disappeared since the previous scan.
    pub removed: usize,
}

struct RunningMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop lifecycle around the polling loop.
///
/// Owns its last-seen table, which survives a stop/start cycle so a restart
/// does not rewrite every sidecar.
pub struct BackgroundMonitor {
    store: ArtifactStore,
    names: CheckpointNames,
    metadata: Arc<MetadataManager>,
    poll_interval: Duration,
    last_seen: LastSeen,
    running: Option<RunningMonitor>,
}

impl BackgroundMonitor {
    pub fn new(
        store: ArtifactStore,
        names: CheckpointNames,
        metadata: Arc<MetadataManager>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            names,
            metadata,
            poll_interval,
            last_seen: Arc::new(Mutex::new(HashMap::new())),
            running: None,
        }
    }

    pub fn from_config(config: &CheckpointConfig, snapshot: RunSnapshot) -> Result<Self> {
        Ok(Self::new(
            ArtifactStore::new(&config.output_directory),
            CheckpointNames::from_config(config)?,
            Arc::new(MetadataManager::new(snapshot)),
            config.poll_interval(),
        ))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(WaypointError::MonitorAlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WaypointError::Task {
            message: format!("monitor needs a tokio runtime: {}", e),
        })?;

        let token = CancellationToken::new();
        let handle = runtime.spawn(run_loop(
            self.store.clone(),
            self.names.clone(),
            Arc::clone(&self.metadata),
            Arc::clone(&self.last_seen),
            self.poll_interval,
            token.clone(),
        ));

        info!(
            "Started checkpoint monitor on {} (every {:?})",
            self.store.root().display(),
            self.poll_interval
        );
        self.running = Some(RunningMonitor { token, handle });
        Ok(())
    }

    /// Stop the loop and wait for it to exit. A no-op when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.token.cancel();
        if let Err(e) = running.handle.await {
            error!("Checkpoint monitor task ended abnormally: {}", e);
        }
        info!("Stopped checkpoint monitor on {}", self.store.root().display());
    }

    /// Run a single scan outside the polling loop.
    pub async fn scan_once(&self) -> Result<ScanSummary> {
        scan(&self.store, &self.names, &self.metadata, &self.last_seen, None).await
    }
}

impl Drop for BackgroundMonitor {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}

async fn run_loop(
    store: ArtifactStore,
    names: CheckpointNames,
    metadata: Arc<MetadataManager>,
    last_seen: LastSeen,
    poll_interval: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        match scan(&store, &names, &metadata, &last_seen, Some(&token)).await {
            Ok(summary) if summary.refreshed > 0 || summary.failed > 0 => {
                info!(
                    "Monitor tick: {} artifacts, {} refreshed, {} failed",
                    summary.scanned, summary.refreshed, summary.failed
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Monitor tick failed: {}", e),
        }
    }
    debug!("Checkpoint monitor loop exited");
}

async fn scan(
    store: &ArtifactStore,
    names: &CheckpointNames,
    metadata: &Arc<MetadataManager>,
    last_seen: &LastSeen,
    token: Option<&CancellationToken>,
) -> Result<ScanSummary> {
    // Held for the whole scan so a manual scan never interleaves with a tick.
    let mut seen = last_seen.lock().await;

    let listing_store = store.clone();
    let listing_names = names.clone();
    let artifacts =
        tokio::task::spawn_blocking(move || listing_store.list_checkpoints(&listing_names))
            .await
            .map_err(|e| WaypointError::Task {
                message: format!("Directory listing task failed: {}", e),
            })??;

    let mut summary = ScanSummary {
        scanned: artifacts.len(),
        ..Default::default()
    };

    let present: HashSet<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
    let before = seen.len();
    seen.retain(|path, _| present.contains(path));
    summary.removed = before - seen.len();

    for artifact in &artifacts {
        let observed = Observed::from(artifact);
        if seen.get(&artifact.path) == Some(&observed) {
            continue;
        }
        if token.map(CancellationToken::is_cancelled).unwrap_or(false) {
            debug!("Monitor cancelled mid-scan");
            break;
        }

        let manager = Arc::clone(metadata);
        let path = artifact.path.clone();
        let outcome = tokio::task::spawn_blocking(move || manager.generate_or_refresh(&path)).await;

        match outcome {
            Ok(Ok(refresh)) => {
                if refresh.written {
                    summary.refreshed += 1;
                } else {
                    summary.current += 1;
                }
                seen.insert(artifact.path.clone(), observed);
            }
            Ok(Err(e)) => {
                summary.failed += 1;
                warn!("Metadata refresh failed for {}: {}", artifact.path.display(), e);
            }
            Err(e) => {
                summary.failed += 1;
                error!("Metadata task for {} panicked: {}", artifact.path.display(), e);
            }
        }
    }

    Ok(summary)
}
