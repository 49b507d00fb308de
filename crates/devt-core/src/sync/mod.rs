//! Repository sync: single, batch and throttled background.

mod background;
mod orchestrator;

pub use background::{BackgroundSync, LAST_SYNC_FILE, SYNC_INTERVAL, SyncThrottle};
pub use orchestrator::{
    BatchSyncReport, RepositoryFailure, RepositorySyncReport, SyncOrchestrator,
};
