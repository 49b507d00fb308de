//! Installs package directories into a scope's `tools/` tree.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, IoContext, Result};
use crate::fs::{copy_tree, remove_dir_forced, remove_if_empty};
use crate::manifest::{find_manifest, is_manifest_file};
use crate::types::Platform;

use super::archive::{create_zip, extract_zip};
use super::{Package, PackageBuilder};

const STAGING_DIR: &str = ".staging";

/// A package that could not be imported.
#[derive(Debug)]
pub struct ImportFailure {
    pub source: PathBuf,
    pub error: Error,
}

/// Outcome of a (possibly bulk) import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub group: String,
    pub packages: Vec<Package>,
    /// Commands deliberately left alone (inactive packages during sync).
    pub skipped: Vec<String>,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decision of an import filter for one previewed package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDecision {
    Import,
    Skip,
}

/// Copies, rebuilds and deletes package directories under `tools/`.
#[derive(Debug, Clone)]
pub struct PackageManager {
    tools_dir: PathBuf,
    platform: Platform,
}

impl PackageManager {
    pub fn new(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            platform: Platform::current(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Install location of a package directory named `dir_name` in `group`.
    pub fn target_dir(&self, group: &str, dir_name: &str) -> PathBuf {
        self.tools_dir.join(group).join(dir_name)
    }

    /// Build the package found in `package_dir` without copying it.
    pub fn build(&self, package_dir: &Path, group: &str) -> Result<Package> {
        PackageBuilder::new(package_dir)?
            .with_group(group)
            .with_platform(self.platform)
            .build()
    }

    /// Import every package found in `source`.
    pub fn import_packages(
        &self,
        source: &Path,
        group: Option<&str>,
        force: bool,
    ) -> Result<ImportReport> {
        self.import_filtered(source, group, force, |_| Ok(ImportDecision::Import))
    }

    /// Import packages from `source`, asking `filter` about each one before
    /// anything is copied. Filter errors are recorded as item failures.
    pub fn import_filtered<F>(
        &self,
        source: &Path,
        group: Option<&str>,
        force: bool,
        mut filter: F,
    ) -> Result<ImportReport>
    where
        F: FnMut(&Package) -> Result<ImportDecision>,
    {
        if !source.exists() {
            return Err(Error::UnsupportedSource {
                path: source.to_path_buf(),
            });
        }

        if is_zip(source) {
            let stem = path_name(source, Path::file_stem)?;
            let group = group.unwrap_or(stem.as_str()).to_string();
            let staging = self
                .tools_dir
                .join(STAGING_DIR)
                .join(format!("{}-{}", stem, std::process::id()));
            remove_dir_forced(&staging)?;
            extract_zip(source, &staging.join(&stem))?;
            let report = self.import_filtered(&staging, Some(group.as_str()), force, filter);
            if let Err(e) = remove_dir_forced(&staging) {
                warn!(error = %e, "failed to clean staging directory");
            }
            remove_if_empty(&self.tools_dir.join(STAGING_DIR))?;
            return report;
        }

        let package_dirs = discover_package_dirs(source)?;
        let source_dir = if source.is_file() {
            source.parent().unwrap_or(source)
        } else {
            source
        };
        let group = match group {
            Some(group) => group.to_string(),
            None => path_name(source_dir, Path::file_name)?,
        };
        info!(source = %source.display(), %group, count = package_dirs.len(), "importing packages");

        let mut report = ImportReport {
            group: group.clone(),
            ..ImportReport::default()
        };
        for dir in package_dirs {
            let preview = match self.build(&dir, &group) {
                Ok(preview) => preview,
                Err(error) => {
                    report.failures.push(ImportFailure { source: dir, error });
                    continue;
                }
            };
            match filter(&preview) {
                Ok(ImportDecision::Import) => {}
                Ok(ImportDecision::Skip) => {
                    debug!(command = %preview.command, "skipping package");
                    report.skipped.push(preview.command);
                    continue;
                }
                Err(error) => {
                    report.failures.push(ImportFailure { source: dir, error });
                    continue;
                }
            }
            match self.install_dir(&dir, &group, force) {
                Ok(package) => report.packages.push(package),
                Err(error) => report.failures.push(ImportFailure { source: dir, error }),
            }
        }
        Ok(report)
    }

    /// Copy one package directory into `tools/<group>/<dir-name>` and build it.
    pub fn install_dir(&self, package_dir: &Path, group: &str, force: bool) -> Result<Package> {
        let dir_name = path_name(package_dir, Path::file_name)?;
        let target = self.target_dir(group, &dir_name);

        if !same_location(package_dir, &target) {
            if target.exists() {
                if !force {
                    return Err(Error::AlreadyExists { path: target });
                }
                remove_dir_forced(&target)?;
            }
            debug!(from = %package_dir.display(), to = %target.display(), "copying package");
            copy_tree(package_dir, &target)?;
        }
        self.build(&target, group)
    }

    /// Rebuild an installed package in place.
    pub fn update_package(&self, location: &Path, group: &str) -> Result<Package> {
        self.build(location, group)
    }

    /// Rebuild every package found under `source` in place.
    pub fn overwrite_packages(&self, source: &Path, group: &str) -> Result<ImportReport> {
        let mut report = ImportReport {
            group: group.to_string(),
            ..ImportReport::default()
        };
        for dir in discover_package_dirs(source)? {
            match self.build(&dir, group) {
                Ok(package) => report.packages.push(package),
                Err(error) => report.failures.push(ImportFailure { source: dir, error }),
            }
        }
        Ok(report)
    }

    /// Delete an installed package directory. Missing directories are fine.
    pub fn delete_package(&self, location: &Path) -> Result<bool> {
        let removed = remove_dir_forced(location)?;
        let tools_dir = self
            .tools_dir
            .canonicalize()
            .unwrap_or_else(|_| self.tools_dir.clone());
        if let Some(group_dir) = location.parent() {
            if group_dir.starts_with(&tools_dir) && group_dir != tools_dir {
                remove_if_empty(group_dir)?;
            }
        }
        Ok(removed)
    }

    /// Export a package as a zip (`<output>/<dir>.zip`) or a directory copy.
    pub fn export_package(
        &self,
        location: &Path,
        output: &Path,
        as_zip: bool,
        force: bool,
    ) -> Result<PathBuf> {
        let dir_name = path_name(location, Path::file_name)?;
        let target = if as_zip {
            output.join(format!("{}.zip", dir_name))
        } else {
            output.join(&dir_name)
        };
        if target.exists() {
            if !force {
                return Err(Error::AlreadyExists { path: target });
            }
            if target.is_dir() {
                remove_dir_forced(&target)?;
            } else {
                std::fs::remove_file(&target)
                    .io_context(|| format!("Failed to remove {}", target.display()))?;
            }
        }

        if as_zip {
            create_zip(location, &target)?;
        } else {
            copy_tree(location, &target)?;
        }
        info!(to = %target.display(), "exported package");
        Ok(target)
    }

    /// Unpack an exported zip into `dest`.
    pub fn unpack_package(&self, zip_path: &Path, dest: &Path) -> Result<PathBuf> {
        extract_zip(zip_path, dest)
    }
}

/// Package directories contained in `source`, sorted.
///
/// A manifest file names its own directory. A directory with a manifest is a
/// single package; otherwise it is scanned recursively and every directory
/// holding a manifest counts as one package (nested directories inside a
/// package belong to it).
pub fn discover_package_dirs(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        if !is_manifest_file(source) {
            return Err(Error::UnsupportedSource {
                path: source.to_path_buf(),
            });
        }
        let dir = source.parent().unwrap_or(Path::new(".")).to_path_buf();
        return Ok(vec![dir]);
    }
    if !source.is_dir() {
        return Err(Error::UnsupportedSource {
            path: source.to_path_buf(),
        });
    }

    let mut found = Vec::new();
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if find_manifest(&dir).is_some() {
            found.push(dir);
            continue;
        }
        for entry in std::fs::read_dir(&dir)
            .io_context(|| format!("Failed to read dir: {}", dir.display()))?
        {
            let entry = entry.io_context(|| format!("Failed to read dir entry: {}", dir.display()))?;
            let name = entry.file_name();
            if name == ".git" || name == STAGING_DIR {
                continue;
            }
            if entry.file_type().map(|ty| ty.is_dir()).unwrap_or(false) {
                pending.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Final name component of `path` (resolving `.`-style paths first).
fn path_name(path: &Path, part: fn(&Path) -> Option<&std::ffi::OsStr>) -> Result<String> {
    let resolved;
    let path = if path.file_name().is_none() {
        resolved = path
            .canonicalize()
            .io_context(|| format!("Failed to resolve {}", path.display()))?;
        resolved.as_path()
    } else {
        path
    };
    part(path)
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::UnsupportedSource {
            path: path.to_path_buf(),
        })
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(dir: &Path, command: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("manifest.yaml"),
            format!("name: {command}\ncommand: {command}\nscripts:\n  install: echo {command}\n"),
        )
        .unwrap();
    }

    #[test]
    fn discovers_single_and_bulk_sources() {
        let temp = TempDir::new().unwrap();
        let bulk = temp.path().join("bulk");
        write_package(&bulk.join("a"), "a");
        write_package(&bulk.join("nested/b"), "b");
        write_package(&bulk.join("a/inner"), "inner");
        std::fs::create_dir_all(bulk.join("empty")).unwrap();

        let dirs = discover_package_dirs(&bulk).unwrap();
        assert_eq!(dirs, vec![bulk.join("a"), bulk.join("nested/b")]);

        let single = discover_package_dirs(&bulk.join("a")).unwrap();
        assert_eq!(single, vec![bulk.join("a")]);

        let file = discover_package_dirs(&bulk.join("a/manifest.yaml")).unwrap();
        assert_eq!(file, vec![bulk.join("a")]);
    }

    #[test]
    fn unsupported_sources_are_rejected() {
        let temp = TempDir::new().unwrap();
        let readme = temp.path().join("README.md");
        std::fs::write(&readme, "hi").unwrap();
        assert!(matches!(
            discover_package_dirs(&readme),
            Err(Error::UnsupportedSource { .. })
        ));

        let manager = PackageManager::new(temp.path().join("tools"));
        assert!(matches!(
            manager.import_packages(&temp.path().join("missing"), None, false),
            Err(Error::UnsupportedSource { .. })
        ));
    }

    #[test]
    fn import_copies_into_group_and_respects_force() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src/t1");
        write_package(&src, "t1");
        let manager = PackageManager::new(temp.path().join("tools"));

        let report = manager.import_packages(&src, None, false).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.group, "t1");
        let installed = temp.path().join("tools/t1/t1");
        assert_eq!(report.packages[0].location, installed.canonicalize().unwrap());

        let again = manager.import_packages(&src, None, false).unwrap();
        assert_eq!(again.failures.len(), 1);
        assert!(matches!(again.failures[0].error, Error::AlreadyExists { .. }));

        std::fs::write(installed.join("stale.txt"), "old").unwrap();
        let forced = manager.import_packages(&src, None, true).unwrap();
        assert!(forced.is_clean());
        assert!(!installed.join("stale.txt").exists());
    }

    #[test]
    fn bulk_import_collects_failures_and_continues() {
        let temp = TempDir::new().unwrap();
        let bulk = temp.path().join("pack");
        write_package(&bulk.join("good"), "good");
        std::fs::create_dir_all(bulk.join("bad")).unwrap();
        std::fs::write(bulk.join("bad/manifest.yaml"), "name: bad\n").unwrap();

        let manager = PackageManager::new(temp.path().join("tools"));
        let report = manager.import_packages(&bulk, Some("mine"), false).unwrap();
        assert_eq!(report.group, "mine");
        assert_eq!(report.packages.len(), 1);
        assert_eq!(report.packages[0].command, "good");
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            Error::ManifestInvalid { .. }
        ));
    }

    #[test]
    fn filter_can_skip_packages() {
        let temp = TempDir::new().unwrap();
        let bulk = temp.path().join("pack");
        write_package(&bulk.join("keep"), "keep");
        write_package(&bulk.join("drop"), "drop");

        let manager = PackageManager::new(temp.path().join("tools"));
        let report = manager
            .import_filtered(&bulk, None, false, |pkg| {
                Ok(if pkg.command == "drop" {
                    ImportDecision::Skip
                } else {
                    ImportDecision::Import
                })
            })
            .unwrap();
        assert_eq!(report.skipped, vec!["drop".to_string()]);
        assert_eq!(report.packages.len(), 1);
        assert!(!temp.path().join("tools/pack/drop").exists());
    }

    #[test]
    fn zip_import_uses_archive_stem_as_group() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("bundle");
        write_package(&src.join("x"), "x");
        let zip_path = temp.path().join("bundle.zip");
        create_zip(&src, &zip_path).unwrap();

        let manager = PackageManager::new(temp.path().join("tools"));
        let report = manager.import_packages(&zip_path, None, false).unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.group, "bundle");
        assert!(temp.path().join("tools/bundle/x/manifest.yaml").is_file());
        assert!(!temp.path().join("tools").join(STAGING_DIR).exists());
    }

    #[test]
    fn overwrite_rebuilds_in_place() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("kit");
        write_package(&src.join("a"), "a");
        std::fs::create_dir_all(src.join("b")).unwrap();
        std::fs::write(src.join("b/manifest.yaml"), "name: b\n").unwrap();
        let manager = PackageManager::new(temp.path().join("tools"));

        let report = manager.overwrite_packages(&src, "kit").unwrap();
        assert_eq!(report.packages.len(), 1);
        assert_eq!(report.packages[0].location, src.join("a").canonicalize().unwrap());
        assert_eq!(report.failures.len(), 1);
        assert!(!temp.path().join("tools").exists());
    }

    #[test]
    fn delete_is_idempotent_and_prunes_group_dir() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("t1");
        write_package(&src, "t1");
        let manager = PackageManager::new(temp.path().join("tools"));
        let pkg = manager.install_dir(&src, "g", false).unwrap();

        assert!(manager.delete_package(&pkg.location).unwrap());
        assert!(!manager.delete_package(&pkg.location).unwrap());
        assert!(!temp.path().join("tools/g").exists());
    }

    #[test]
    fn export_then_unpack_reproduces_package() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("t1");
        write_package(&src, "t1");
        std::fs::create_dir_all(src.join("lib")).unwrap();
        std::fs::write(src.join("lib/helper.sh"), "echo helper").unwrap();
        let manager = PackageManager::new(temp.path().join("tools"));

        let zip = manager
            .export_package(&src, &temp.path().join("out"), true, false)
            .unwrap();
        assert_eq!(zip, temp.path().join("out/t1.zip"));
        assert!(matches!(
            manager.export_package(&src, &temp.path().join("out"), true, false),
            Err(Error::AlreadyExists { .. })
        ));

        let dest = manager
            .unpack_package(&zip, &temp.path().join("unpacked"))
            .unwrap();
        let original = manager.build(&src, "g").unwrap();
        let restored = manager.build(&dest, "g").unwrap();
        assert_eq!(original.scripts, restored.scripts);
        assert_eq!(
            std::fs::read_to_string(dest.join("lib/helper.sh")).unwrap(),
            "echo helper"
        );

        let copy = manager
            .export_package(&src, &temp.path().join("plain"), false, false)
            .unwrap();
        assert!(copy.join("manifest.yaml").is_file());
    }
}
