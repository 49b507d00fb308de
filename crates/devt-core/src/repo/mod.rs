//! Local clones of tool repositories under a scope's `repos/` directory.

mod git;

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::fs::remove_dir_forced;

/// Where a clone ended up after an add or sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub path: PathBuf,
    /// Branch checked out after the operation, `None` when detached.
    pub branch: Option<String>,
    /// `HEAD` moved (always true for a fresh clone).
    pub changed: bool,
}

/// Clones, updates and removes repositories.
#[derive(Debug, Clone)]
pub struct RepoManager {
    repos_dir: PathBuf,
}

impl RepoManager {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
        }
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    /// Clone location for `url`.
    pub fn repo_dir(&self, url: &str) -> PathBuf {
        self.repos_dir.join(repo_name_from_url(url))
    }

    /// Map a URL, absolute path or bare name to a clone directory.
    pub fn resolve_identifier(&self, identifier: &str) -> PathBuf {
        if is_remote_url(identifier) {
            return self.repo_dir(identifier);
        }
        let path = Path::new(identifier);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repos_dir.join(identifier)
        }
    }

    /// Clone `url`, or update the existing clone.
    ///
    /// With `force` an existing clone is deleted and cloned again.
    pub fn add_repo(&self, url: &str, branch: Option<&str>, force: bool) -> Result<SyncOutcome> {
        let path = self.repo_dir(url);
        if path.exists() {
            if !force {
                info!(url, "repository already cloned, syncing instead");
                return self.sync_path(url, &path, branch);
            }
            remove_dir_forced(&path)?;
        }

        std::fs::create_dir_all(&self.repos_dir).map_err(|e| Error::repo_sync(url, e))?;
        info!(url, dest = %path.display(), "cloning repository");
        git::clone(url, &path, branch).map_err(|e| Error::repo_sync(url, e))?;
        let branch = git::current_branch(&path).map_err(|e| Error::repo_sync(url, e))?;
        Ok(SyncOutcome {
            path,
            branch,
            changed: true,
        })
    }

    /// Bring an existing clone up to date with `origin`.
    pub fn sync_repo(&self, identifier: &str, branch: Option<&str>) -> Result<SyncOutcome> {
        let path = self.resolve_identifier(identifier);
        self.sync_path(identifier, &path, branch)
    }

    fn sync_path(&self, identifier: &str, path: &Path, branch: Option<&str>) -> Result<SyncOutcome> {
        if !path.is_dir() {
            return Err(Error::RepoNotFound {
                identifier: identifier.to_string(),
            });
        }
        let fail = |e: git::GitError| Error::repo_sync(identifier, e);

        let before = git::head_commit(path).map_err(fail)?;
        if git::is_dirty(path).map_err(fail)? {
            warn!(repo = %path.display(), "discarding local changes");
            git::reset_hard(path).map_err(fail)?;
        }

        if let Some(branch) = branch {
            let current = git::current_branch(path).map_err(fail)?;
            if current.as_deref() != Some(branch) {
                if git::has_branch(path, branch).map_err(fail)? {
                    git::checkout(path, branch).map_err(fail)?;
                } else {
                    warn!(repo = %path.display(), branch, "branch not found, staying on current branch");
                }
            }
        }

        let current = git::current_branch(path).map_err(fail)?;
        git::fetch_and_reset(path, current.as_deref()).map_err(fail)?;
        let after = git::head_commit(path).map_err(fail)?;
        let changed = before != after;
        info!(repo = %path.display(), changed, "repository synced");

        Ok(SyncOutcome {
            path: path.to_path_buf(),
            branch: current,
            changed,
        })
    }

    /// Delete a clone. Returns `false` when it was already gone.
    pub fn remove_repo(&self, identifier: &str) -> Result<bool> {
        let path = self.resolve_identifier(identifier);
        let removed = remove_dir_forced(&path)?;
        if removed {
            info!(repo = %path.display(), "removed repository clone");
        }
        Ok(removed)
    }

    /// Commit id currently checked out in the clone at `path`.
    pub fn head_commit(&self, path: &Path) -> Result<String> {
        git::head_commit(path).map_err(|e| Error::repo_sync(path.display().to_string(), e))
    }
}

/// Remote URL forms accepted as repository identifiers.
pub fn is_remote_url(value: &str) -> bool {
    ["http://", "https://", "ssh://", "git://", "file://", "git@"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

/// Repository name derived from the last path segment of `url`, minus `.git`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let path_part = match Url::parse(trimmed) {
        // Single-letter schemes are Windows drive letters.
        Ok(parsed) if parsed.scheme().len() > 1 => parsed.path().to_string(),
        _ => match trimmed.split_once(':') {
            Some((host, rest)) if host.contains('@') => rest.to_string(),
            _ => trimmed.to_string(),
        },
    };
    let last = path_part
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repository".to_string()
    } else {
        name.to_string()
    }
}
