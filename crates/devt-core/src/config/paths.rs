//! Scope root resolution helpers.

use std::path::{Path, PathBuf};

/// Name of the per-scope settings file.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the user scope root.
pub const DEVT_HOME_ENV: &str = "DEVT_HOME";

const APP_DIR: &str = "devt";
const WORKSPACE_DIR: &str = ".devt";

/// User scope root: `$DEVT_HOME`, else `<data dir>/devt`, else `~/.devt`.
pub fn default_user_root() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os(DEVT_HOME_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(home));
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .or_else(|| dirs::home_dir().map(|home| home.join(WORKSPACE_DIR)))
}

/// Workspace scope root for a working directory.
pub fn workspace_root(cwd: &Path) -> PathBuf {
    cwd.join(WORKSPACE_DIR)
}
