//! Copying and moving packages between the user and workspace scopes.
//!
//! The two scopes never share a registry handle: a transfer installs the
//! files into the target scope, registers them there and only then touches
//! the source scope.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::package::Package;
use crate::tools::ToolService;

/// Copy `command` from `source` into `target`, keeping its group and
/// active flag. The source scope is left untouched.
pub fn copy_package(
    source: &ToolService,
    target: &ToolService,
    command: &str,
    force: bool,
) -> Result<Package> {
    if source.scope() == target.scope() {
        return Err(Error::Config(format!(
            "source and target scope are both '{}'",
            source.scope()
        )));
    }
    let package = source.info(command)?;
    target.check_registrable(&package, force)?;

    let mut installed = target
        .packages()
        .install_dir(&package.location, &package.group, force)?;
    installed.active = package.active;

    match target.registry().register_package(&installed, force) {
        Ok(stored) => {
            info!(
                %command,
                from = %source.scope(),
                to = %target.scope(),
                "copied package"
            );
            Ok(stored)
        }
        Err(error) => {
            if let Err(cleanup) = target.packages().delete_package(&installed.location) {
                warn!(error = %cleanup, "failed to clean up copied package");
            }
            Err(error)
        }
    }
}

/// Move `command` into `target` so it stays registered in that scope only.
pub fn move_package(
    source: &ToolService,
    target: &ToolService,
    command: &str,
    force: bool,
) -> Result<Package> {
    let moved = copy_package(source, target, command, force)?;
    source.remove(command)?;
    info!(%command, to = %target.scope(), "moved package");
    Ok(moved)
}
