//! Tool operations for one scope: registry rows and package files together.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::package::{ImportDecision, ImportFailure, ImportReport, Package, PackageManager};
use crate::registry::{PackageFilter, Registry};
use crate::script::ScriptRun;
use crate::types::{Platform, Scope};

/// A tool that failed during a group-wide operation.
#[derive(Debug)]
pub struct ToolFailure {
    pub command: String,
    pub error: Error,
}

/// Outcome of rebuilding several installed tools.
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub rebuilt: Vec<Package>,
    pub failures: Vec<ToolFailure>,
}

/// Registry plus package manager of a single scope.
#[derive(Debug, Clone)]
pub struct ToolService {
    registry: Registry,
    packages: PackageManager,
}

impl ToolService {
    pub fn new(registry: Registry, packages: PackageManager) -> Self {
        Self { registry, packages }
    }

    /// Service whose package manager installs into the registry's `tools/`.
    pub fn for_registry(registry: Registry, platform: Platform) -> Self {
        let packages = PackageManager::new(registry.tools_dir()).with_platform(platform);
        Self::new(registry, packages)
    }

    pub fn scope(&self) -> Scope {
        self.registry.scope()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn packages(&self) -> &PackageManager {
        &self.packages
    }

    /// Import and register every package found in `source`.
    pub fn import(&self, source: &Path, group: Option<&str>, force: bool) -> Result<ImportReport> {
        self.import_with(source, group, force, |_| Ok(ImportDecision::Import))
    }

    /// Import with an extra per-package decision made before any copy.
    pub fn import_with<F>(
        &self,
        source: &Path,
        group: Option<&str>,
        force: bool,
        mut filter: F,
    ) -> Result<ImportReport>
    where
        F: FnMut(&Package) -> Result<ImportDecision>,
    {
        let mut report = self
            .packages
            .import_filtered(source, group, force, |preview| {
                self.check_registrable(preview, force)?;
                filter(preview)
            })?;

        let installed = std::mem::take(&mut report.packages);
        for package in installed {
            match self.registry.register_package(&package, force) {
                Ok(stored) => report.packages.push(stored),
                Err(error) => report.failures.push(ImportFailure {
                    source: package.location.clone(),
                    error,
                }),
            }
        }
        info!(
            scope = %self.scope(),
            group = %report.group,
            imported = report.packages.len(),
            failed = report.failures.len(),
            "import finished"
        );
        Ok(report)
    }

    /// Reject packages whose command is taken, before any file is touched.
    pub fn check_registrable(&self, package: &Package, force: bool) -> Result<()> {
        let Some(existing) = self.registry.get_package(&package.command)? else {
            return Ok(());
        };
        if existing.group != package.group {
            return Err(Error::duplicate(
                "Package",
                format!(
                    "{} (registered in group '{}')",
                    package.command, existing.group
                ),
            ));
        }
        if !force {
            return Err(Error::duplicate("Package", &package.command));
        }
        Ok(())
    }

    pub fn info(&self, command: &str) -> Result<Package> {
        self.registry
            .get_package(command)?
            .ok_or_else(|| Error::not_found("Package", command))
    }

    /// Look a tool up by command or display name.
    pub fn find(&self, name_or_command: &str, group: Option<&str>) -> Result<Package> {
        self.registry
            .find_package(name_or_command, group)?
            .ok_or_else(|| Error::not_found("Package", name_or_command))
    }

    pub fn list(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        self.registry.list_packages(filter)
    }

    /// Rebuild an installed tool from its manifest, keeping `install_date`.
    pub fn update(&self, command: &str) -> Result<Package> {
        let package = self.info(command)?;
        let rebuilt = self
            .packages
            .update_package(&package.location, &package.group)?;
        if rebuilt.command != package.command {
            return Err(Error::ManifestInvalid {
                path: package.location,
                reason: format!(
                    "command changed from '{}' to '{}'; reinstall the tool instead",
                    package.command, rebuilt.command
                ),
            });
        }
        self.registry.replace_package(&rebuilt)
    }

    /// Rebuild every tool of `group`.
    pub fn update_group(&self, group: &str) -> Result<RebuildReport> {
        let filter = PackageFilter::new().with_group(group);
        self.rebuild_matching(&filter)
    }

    /// Rebuild every active tool of the scope in place.
    pub fn sync_active(&self) -> Result<RebuildReport> {
        let filter = PackageFilter::new().with_active(true);
        self.rebuild_matching(&filter)
    }

    fn rebuild_matching(&self, filter: &PackageFilter) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();
        for package in self.registry.list_packages(filter)? {
            match self.update(&package.command) {
                Ok(rebuilt) => report.rebuilt.push(rebuilt),
                Err(error) => {
                    warn!(command = %package.command, error = %error, "rebuild failed");
                    report.failures.push(ToolFailure {
                        command: package.command,
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Unregister a tool and delete its installed files.
    ///
    /// Files outside this scope's `tools/` directory are left in place.
    pub fn remove(&self, command: &str) -> Result<Package> {
        let package = self.registry.unregister_package(command)?;
        if self.owns_location(&package.location) {
            self.packages.delete_package(&package.location)?;
        } else {
            warn!(
                location = %package.location.display(),
                "package lives outside the tools directory, files kept"
            );
        }
        Ok(package)
    }

    /// Remove every tool of `group`.
    pub fn remove_group(&self, group: &str) -> Result<Vec<Package>> {
        let filter = PackageFilter::new().with_group(group);
        self.registry
            .list_packages(&filter)?
            .iter()
            .map(|package| self.remove(&package.command))
            .collect()
    }

    pub fn set_active(&self, command: &str, active: bool) -> Result<Package> {
        if active {
            self.registry.activate_package(command)
        } else {
            self.registry.deactivate_package(command)
        }
    }

    pub fn export(&self, command: &str, output: &Path, as_zip: bool, force: bool) -> Result<PathBuf> {
        let package = self.info(command)?;
        self.packages
            .export_package(&package.location, output, as_zip, force)
    }

    /// Run `script` of the tool registered as `command`.
    pub fn run(&self, command: &str, script: &str, extra_args: &[String]) -> Result<ScriptRun> {
        let package = self.info(command)?;
        package.run_script(script, extra_args, self.packages.platform())
    }

    fn owns_location(&self, location: &Path) -> bool {
        let tools_dir = self.packages.tools_dir();
        let tools_dir = tools_dir
            .canonicalize()
            .unwrap_or_else(|_| tools_dir.to_path_buf());
        location.starts_with(&tools_dir) || location.starts_with(self.packages.tools_dir())
    }
}
