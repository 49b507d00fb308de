//! Builds a [`Package`] from a directory holding a manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::{Error, IoContext, Result};
use crate::manifest::{self, Manifest};
use crate::types::Platform;

use super::{DEFAULT_GROUP, Package};

/// Reads a package directory into a registry-ready [`Package`].
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    package_dir: PathBuf,
    manifest: Manifest,
    group: String,
    platform: Platform,
}

impl PackageBuilder {
    /// Locate and validate the manifest of `package_dir`.
    pub fn new(package_dir: &Path) -> Result<Self> {
        let package_dir = package_dir
            .canonicalize()
            .io_context(|| format!("Failed to resolve package dir {}", package_dir.display()))?;
        let manifest = manifest::load_from_dir(&package_dir)?;
        Ok(Self {
            package_dir,
            manifest,
            group: DEFAULT_GROUP.to_string(),
            platform: Platform::current(),
        })
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Resolve every script and assemble the package.
    ///
    /// Scripts that exist only for another OS are left out.
    pub fn build(&self) -> Result<Package> {
        let mut scripts = BTreeMap::new();
        for name in manifest::script_names(&self.manifest, self.platform) {
            match manifest::resolve_script(&self.manifest, &name, self.platform) {
                Ok(script) => {
                    scripts.insert(name, script);
                }
                Err(Error::ScriptNotFound { .. }) => {
                    debug!(script = %name, platform = %self.platform, "script not available");
                }
                Err(e) => return Err(e),
            }
        }

        let now = Utc::now();
        Ok(Package {
            command: self.manifest.command.clone(),
            name: self.manifest.name.clone(),
            description: self.manifest.description.clone(),
            location: self.package_dir.clone(),
            dependencies: self.manifest.dependencies.clone(),
            group: self.group.clone(),
            active: true,
            install_date: now,
            last_update: now,
            scripts,
        })
    }
}
