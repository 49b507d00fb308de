//! devt core library
//!
//! Domain logic for installing development tools described by manifests,
//! running their scripts, and keeping them in sync with git repositories,
//! across a per-user and a per-workspace scope.

pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod repo;
pub mod script;
pub mod sync;
pub mod tools;
pub mod transfer;
pub mod types;

pub use error::{Error, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, DevtConfig, EffectiveConfig};
    pub use crate::context::AppContext;

    // Manifests and scripts
    pub use crate::manifest::{Manifest, load_manifest, resolve_script};
    pub use crate::script::{CommandLine, Script, ScriptRun};

    // Packages and registry
    pub use crate::package::{ImportReport, Package, PackageManager};
    pub use crate::registry::{PackageFilter, Registry, Repository, RepositoryFilter};
    pub use crate::tools::ToolService;

    // Sync
    pub use crate::sync::{BackgroundSync, BatchSyncReport, SyncOrchestrator};

    pub use crate::error::{Error, Result};
    pub use crate::types::{Platform, Scope, ScopeSelector};
}
