//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{self, ConfigStore, DevtConfig, EffectiveConfig};
use crate::error::{Error, IoContext, Result};
use crate::package::Package;
use crate::registry::Registry;
use crate::sync::{BackgroundSync, SyncOrchestrator};
use crate::tools::ToolService;
use crate::types::{Platform, Scope, ScopeSelector};

/// Scope roots plus the platform every service is built for.
///
/// Frontends create this once; each accessor hands out a fresh service bound
/// to one scope, so nothing is shared between the user and workspace stores.
#[derive(Debug, Clone)]
pub struct AppContext {
    user_root: PathBuf,
    workspace_root: PathBuf,
    platform: Platform,
}

impl AppContext {
    /// Create a new context with explicit scope roots.
    pub fn new(user_root: PathBuf, workspace_root: PathBuf) -> Self {
        Self {
            user_root,
            workspace_root,
            platform: Platform::current(),
        }
    }

    /// Context for the current user and working directory.
    pub fn from_env() -> Result<Self> {
        let user_root = config::default_user_root()
            .ok_or_else(|| Error::Config("could not determine a data directory".into()))?;
        let cwd = std::env::current_dir().io_context(|| "Failed to read working directory")?;
        Ok(Self::new(user_root, config::workspace_root(&cwd)))
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn user_root(&self) -> &Path {
        &self.user_root
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn root(&self, scope: Scope) -> &Path {
        match scope {
            Scope::User => &self.user_root,
            Scope::Workspace => &self.workspace_root,
        }
    }

    /// A registry database already exists for `scope`.
    pub fn scope_exists(&self, scope: Scope) -> bool {
        Registry::exists(self.root(scope))
    }

    /// Open (creating when needed) the registry of `scope`.
    pub fn registry(&self, scope: Scope) -> Result<Registry> {
        Registry::open(scope, self.root(scope))
    }

    pub fn tool_service(&self, scope: Scope) -> Result<ToolService> {
        Ok(ToolService::for_registry(self.registry(scope)?, self.platform))
    }

    pub fn sync_orchestrator(&self, scope: Scope) -> Result<SyncOrchestrator> {
        Ok(SyncOrchestrator::new(self.tool_service(scope)?))
    }

    pub fn background_sync(&self, scope: Scope) -> Result<BackgroundSync> {
        Ok(BackgroundSync::new(self.sync_orchestrator(scope)?))
    }

    pub fn config_store(&self, scope: Scope) -> ConfigStore {
        ConfigStore::for_root(scope, self.root(scope))
    }

    /// The user file, then the workspace file, then `overrides`, with unset
    /// keys still unset.
    pub fn layered_config(&self, overrides: &DevtConfig) -> Result<DevtConfig> {
        let user = self.config_store(Scope::User).load()?;
        let workspace = self.config_store(Scope::Workspace).load()?;
        Ok(DevtConfig::new()
            .merge(&user)
            .merge(&workspace)
            .merge(overrides))
    }

    /// [`Self::layered_config`] with defaults filled in.
    pub fn effective_config(&self, overrides: &DevtConfig) -> Result<EffectiveConfig> {
        Ok(self.layered_config(overrides)?.resolve())
    }

    /// Services of the scopes in `selector` whose registry exists, in lookup
    /// order. Scopes without a registry are not created.
    pub fn existing_services(&self, selector: ScopeSelector) -> Result<Vec<ToolService>> {
        selector
            .scopes()
            .into_iter()
            .filter(|scope| self.scope_exists(*scope))
            .map(|scope| self.tool_service(scope))
            .collect()
    }

    /// First scope (workspace before user) that knows `name_or_command`.
    pub fn find_package(
        &self,
        name_or_command: &str,
        selector: ScopeSelector,
    ) -> Result<(ToolService, Package)> {
        for service in self.existing_services(selector)? {
            if let Some(package) = service.registry().find_package(name_or_command, None)? {
                debug!(command = %package.command, scope = %service.scope(), "resolved package");
                return Ok((service, package));
            }
        }
        Err(Error::not_found("Package", name_or_command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> AppContext {
        AppContext::new(temp.path().join("user"), temp.path().join("ws/.devt"))
    }

    fn install(service: &ToolService, temp: &TempDir, command: &str, text: &str) {
        let src = temp.path().join("src").join(service.scope().as_str()).join(command);
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("manifest.yaml"),
            format!("name: {command}\ncommand: {command}\nscripts:\n  install: echo {text}\n"),
        )
        .unwrap();
        service.import(&src, None, false).unwrap();
    }

    #[test]
    fn workspace_shadows_user() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let user = ctx.tool_service(Scope::User).unwrap();
        let ws = ctx.tool_service(Scope::Workspace).unwrap();
        install(&user, &temp, "fmt", "user");
        install(&ws, &temp, "fmt", "workspace");

        let (service, _) = ctx.find_package("fmt", ScopeSelector::Both).unwrap();
        assert_eq!(service.scope(), Scope::Workspace);
        let (service, _) = ctx.find_package("fmt", ScopeSelector::Only(Scope::User)).unwrap();
        assert_eq!(service.scope(), Scope::User);
    }

    #[test]
    fn lookup_does_not_create_missing_scopes() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        assert!(matches!(
            ctx.find_package("fmt", ScopeSelector::Both),
            Err(Error::NotFound { .. })
        ));
        assert!(!ctx.workspace_root().exists());
        assert!(!ctx.user_root().exists());
    }

    #[test]
    fn effective_config_layers_scope_files() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        ctx.config_store(Scope::User)
            .save(&DevtConfig {
                auto_sync: Some(true),
                log_level: Some("info".into()),
                ..DevtConfig::default()
            })
            .unwrap();
        ctx.config_store(Scope::Workspace)
            .save(&DevtConfig {
                scope: Some(Scope::Workspace),
                ..DevtConfig::default()
            })
            .unwrap();

        let overrides = DevtConfig {
            log_level: Some("debug".into()),
            ..DevtConfig::default()
        };
        let effective = ctx.effective_config(&overrides).unwrap();
        assert_eq!(effective.scope, Scope::Workspace);
        assert!(effective.auto_sync);
        assert_eq!(effective.log_level, "debug");
    }
}
