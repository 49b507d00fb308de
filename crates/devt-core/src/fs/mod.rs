//! Filesystem primitives shared across features.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{IoContext, Result};

/// Directory names never copied between package locations.
const SKIPPED_DIRS: [&str; 1] = [".git"];

/// Recursively copy `src` into `dst`, skipping version-control metadata.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .io_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in fs::read_dir(src).io_context(|| format!("Failed to read dir: {}", src.display()))? {
        let entry = entry.io_context(|| format!("Failed to read dir entry: {}", src.display()))?;
        let ty = entry
            .file_type()
            .io_context(|| format!("Failed to stat dir entry: {}", entry.path().display()))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if ty.is_dir() {
            if SKIPPED_DIRS.iter().any(|skip| entry.file_name() == *skip) {
                continue;
            }
            copy_tree(&from, &to)?;
        } else if ty.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to).io_context(|| {
                format!(
                    "Failed to copy file from {} to {}",
                    from.display(),
                    to.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target =
        fs::read_link(from).io_context(|| format!("Failed to read link: {}", from.display()))?;
    std::os::unix::fs::symlink(&target, to)
        .io_context(|| format!("Failed to create link: {}", to.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        return copy_tree(from, to);
    }
    fs::copy(from, to)
        .map(|_| ())
        .io_context(|| format!("Failed to copy {}", from.display()))
}

/// Delete a directory tree, clearing read-only flags when deletion is refused.
///
/// Returns `false` when there was nothing to delete.
pub fn remove_dir_forced(path: &Path) -> Result<bool> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(false);
    }
    match fs::remove_dir_all(path) {
        Ok(()) => return Ok(true),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!(path = %path.display(), "retrying removal after clearing read-only flags");
        }
        Err(e) => {
            return Err(e).io_context(|| format!("Failed to remove {}", path.display()));
        }
    }
    make_tree_writable(path)
        .io_context(|| format!("Failed to make {} writable", path.display()))?;
    fs::remove_dir_all(path).io_context(|| format!("Failed to remove {}", path.display()))?;
    Ok(true)
}

fn make_tree_writable(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    set_writable(path, &meta)?;
    if meta.is_dir() {
        for entry in fs::read_dir(path)? {
            make_tree_writable(&entry?.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o700))
}

#[cfg(not(unix))]
fn set_writable(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    let mut permissions = meta.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

/// Remove `dir` when it exists and has no entries left.
pub fn remove_if_empty(dir: &Path) -> Result<()> {
    let is_empty = match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => return Ok(()),
    };
    if is_empty {
        fs::remove_dir(dir).io_context(|| format!("Failed to remove {}", dir.display()))?;
    }
    Ok(())
}
