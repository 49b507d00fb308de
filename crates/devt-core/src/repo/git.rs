//! Thin git layer: the `git` CLI for network operations, git2 for queries.

use std::fmt;
use std::path::Path;
use std::process::Command;

use git2::{BranchType, Repository, ResetType, StatusOptions};

/// Environment overrides that would point git at another repository.
const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

/// A failed git operation, rendered as one line.
#[derive(Debug)]
pub(crate) struct GitError(String);

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        Self(err.message().to_string())
    }
}

pub(crate) type GitResult<T> = std::result::Result<T, GitError>;

fn git_command() -> Command {
    let mut cmd = Command::new("git");
    for key in GIT_ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    // Never block on a credential prompt.
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

/// Run git and return trimmed stdout.
pub(crate) fn run_git(cwd: Option<&Path>, args: &[&str]) -> GitResult<String> {
    let mut cmd = git_command();
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .map_err(|e| GitError(format!("Failed to run git {:?}: {}", args, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub(crate) fn clone(url: &str, dest: &Path, branch: Option<&str>) -> GitResult<()> {
    let dest = dest.to_string_lossy();
    let mut args = vec!["clone"];
    if let Some(branch) = branch {
        args.extend(["--branch", branch]);
    }
    args.extend([url, dest.as_ref()]);
    run_git(None, &args).map(|_| ())
}

/// Commit id of `HEAD`.
pub(crate) fn head_commit(path: &Path) -> GitResult<String> {
    let repo = Repository::open(path)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// Checked-out branch name, `None` when `HEAD` is detached.
pub(crate) fn current_branch(path: &Path) -> GitResult<Option<String>> {
    let repo = Repository::open(path)?;
    let head = repo.head()?;
    if !head.is_branch() {
        return Ok(None);
    }
    Ok(head.shorthand().map(str::to_string))
}

/// Tracked files differ from `HEAD`. Untracked files do not count.
pub(crate) fn is_dirty(path: &Path) -> GitResult<bool> {
    let repo = Repository::open(path)?;
    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(!statuses.is_empty())
}

/// Discard tracked modifications.
pub(crate) fn reset_hard(path: &Path) -> GitResult<()> {
    let repo = Repository::open(path)?;
    let head = repo.head()?.peel_to_commit()?;
    repo.reset(head.as_object(), ResetType::Hard, None)?;
    Ok(())
}

/// A local branch or an `origin/<name>` remote branch exists.
pub(crate) fn has_branch(path: &Path, name: &str) -> GitResult<bool> {
    let repo = Repository::open(path)?;
    if repo.find_branch(name, BranchType::Local).is_ok() {
        return Ok(true);
    }
    Ok(repo
        .find_branch(&format!("origin/{}", name), BranchType::Remote)
        .is_ok())
}

pub(crate) fn checkout(path: &Path, branch: &str) -> GitResult<()> {
    run_git(Some(path), &["checkout", branch]).map(|_| ())
}

/// Fetch `branch` (the remote default when `None`) and move the work tree to it.
pub(crate) fn fetch_and_reset(path: &Path, branch: Option<&str>) -> GitResult<()> {
    run_git(Some(path), &["fetch", "origin", branch.unwrap_or("HEAD")])?;
    run_git(Some(path), &["reset", "--hard", "FETCH_HEAD"]).map(|_| ())
}
