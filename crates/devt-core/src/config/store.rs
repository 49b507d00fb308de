//! Config store for loading and saving a scope's config.toml.

use std::path::{Path, PathBuf};

use crate::error::{Error, IoContext, Result};
use crate::types::Scope;

use super::{CONFIG_FILE, DevtConfig};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    scope: Scope,
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store for the `config.toml` directly under a scope root.
    pub fn for_root(scope: Scope, root: &Path) -> Self {
        Self::from_path(scope, root.join(CONFIG_FILE))
    }

    pub fn from_path(scope: Scope, config_path: PathBuf) -> Self {
        Self { scope, config_path }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Parsed file contents; a missing file is an empty layer.
    pub fn load(&self) -> Result<DevtConfig> {
        if !self.config_path.exists() {
            return Ok(DevtConfig::new());
        }
        let content = std::fs::read_to_string(&self.config_path).io_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "{}: {}",
                self.config_path.display(),
                e.message()
            ))
        })
    }

    pub fn save(&self, config: &DevtConfig) -> Result<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config to TOML: {e}")))?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).io_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).io_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }

    /// Delete the file so every key falls back to the layers below.
    pub fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.config_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(Error::Io {
                context: format!("Failed to remove config file: {}", self.config_path.display()),
                source: e,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty_layer() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::for_root(Scope::User, temp.path());
        assert_eq!(store.load().unwrap(), DevtConfig::new());
    }

    #[test]
    fn save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::for_root(Scope::Workspace, &temp.path().join("nested/.devt"));
        let config = DevtConfig {
            scope: Some(Scope::Workspace),
            auto_sync: Some(true),
            log_level: Some("info".into()),
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);

        store.reset().unwrap();
        assert_eq!(store.load().unwrap(), DevtConfig::new());
        store.reset().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::for_root(Scope::User, temp.path());
        std::fs::write(store.config_path(), "colour = \"blue\"\n").unwrap();
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }
}
