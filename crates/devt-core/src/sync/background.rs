//! Throttled background auto-sync.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{IoContext, Result};

use super::{BatchSyncReport, SyncOrchestrator};

/// Minimum time between two background syncs of the same scope.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Stamp file under the scope root holding the last trigger time.
pub const LAST_SYNC_FILE: &str = ".last-sync";

/// Persisted "last triggered" stamp, in whole seconds since the epoch.
#[derive(Debug, Clone)]
pub struct SyncThrottle {
    stamp_path: PathBuf,
    interval: Duration,
}

impl SyncThrottle {
    pub fn new(root: &Path) -> Self {
        Self {
            stamp_path: root.join(LAST_SYNC_FILE),
            interval: SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn stamp_path(&self) -> &Path {
        &self.stamp_path
    }

    pub fn last_sync(&self) -> Option<SystemTime> {
        let raw = std::fs::read_to_string(&self.stamp_path).ok()?;
        let secs = raw.trim().parse::<u64>().ok()?;
        Some(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Record a trigger and return `true`, or return `false` when the last one
    /// is still inside the interval.
    pub fn try_acquire(&self) -> Result<bool> {
        let now = SystemTime::now();
        if let Some(last) = self.last_sync()
            && let Ok(elapsed) = now.duration_since(last)
            && elapsed < self.interval
        {
            debug!(elapsed_secs = elapsed.as_secs(), "background sync throttled");
            return Ok(false);
        }

        if let Some(parent) = self.stamp_path.parent() {
            std::fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        std::fs::write(&self.stamp_path, secs.to_string())
            .io_context(|| format!("Failed to write {}", self.stamp_path.display()))?;
        Ok(true)
    }
}

/// Entry point the CLI calls on every invocation.
#[derive(Debug, Clone)]
pub struct BackgroundSync {
    orchestrator: SyncOrchestrator,
    throttle: SyncThrottle,
}

impl BackgroundSync {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        let throttle = SyncThrottle::new(orchestrator.registry().root());
        Self {
            orchestrator,
            throttle,
        }
    }

    pub fn with_throttle(mut self, throttle: SyncThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Spawn a batch sync on `handle` unless one was triggered recently.
    ///
    /// Callers that need the result await the returned handle; dropping it
    /// leaves the task running.
    pub fn trigger(&self, handle: &Handle) -> Result<Option<JoinHandle<Result<BatchSyncReport>>>> {
        if !self.throttle.try_acquire()? {
            return Ok(None);
        }
        info!(scope = %self.orchestrator.registry().scope(), "starting background sync");
        let orchestrator = self.orchestrator.clone();
        Ok(Some(handle.spawn(async move {
            orchestrator.sync_all_auto_sync(false).await
        })))
    }
}
