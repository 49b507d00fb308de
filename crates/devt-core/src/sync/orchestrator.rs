//! Keeps registry rows in step with the repository clones they came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::package::{ImportDecision, ImportReport, Package};
use crate::registry::{Registry, Repository, RepositoryFilter, RepositoryUpdate};
use crate::repo::{RepoManager, repo_name_from_url};
use crate::tools::ToolService;

/// Result of adding or syncing one repository.
#[derive(Debug)]
pub struct RepositorySyncReport {
    pub name: String,
    pub url: String,
    pub path: PathBuf,
    pub branch: Option<String>,
    pub changed: bool,
    /// `None` when nothing changed and no import ran.
    pub import: Option<ImportReport>,
}

impl RepositorySyncReport {
    pub fn imported(&self) -> &[Package] {
        self.import
            .as_ref()
            .map(|report| report.packages.as_slice())
            .unwrap_or_default()
    }
}

/// A repository whose sync failed inside a batch.
#[derive(Debug)]
pub struct RepositoryFailure {
    pub name: String,
    pub url: String,
    pub error: Error,
}

/// Per-repository outcome of a batch sync.
#[derive(Debug, Default)]
pub struct BatchSyncReport {
    pub synced: Vec<RepositorySyncReport>,
    pub failures: Vec<RepositoryFailure>,
}

impl BatchSyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Repository lifecycle for one scope.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    tools: ToolService,
    repos: RepoManager,
}

impl SyncOrchestrator {
    pub fn new(tools: ToolService) -> Self {
        let repos = RepoManager::new(tools.registry().repos_dir());
        Self { tools, repos }
    }

    pub fn registry(&self) -> &Registry {
        self.tools.registry()
    }

    pub fn tools(&self) -> &ToolService {
        &self.tools
    }

    pub fn repos(&self) -> &RepoManager {
        &self.repos
    }

    /// Clone `url`, import its packages under the repository name and record it.
    pub fn add_repository(
        &self,
        url: &str,
        name: Option<&str>,
        branch: Option<&str>,
        auto_sync: bool,
        force: bool,
    ) -> Result<RepositorySyncReport> {
        if !force && self.registry().get_repository(url)?.is_some() {
            return Err(Error::duplicate("Repository", url));
        }
        let outcome = self.repos.add_repo(url, branch, force)?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| repo_name_from_url(url));

        let import = self.tools.import(&outcome.path, Some(&name), force)?;
        let repo = Repository::new(url, name.as_str(), outcome.path.as_path())
            .with_branch(outcome.branch.clone())
            .with_auto_sync(auto_sync);
        self.registry().save_repository(&repo)?;
        info!(repo = %name, imported = import.packages.len(), "repository added");

        Ok(RepositorySyncReport {
            name,
            url: url.to_string(),
            path: outcome.path,
            branch: outcome.branch,
            changed: true,
            import: Some(import),
        })
    }

    /// Repository row by URL, falling back to its display name.
    pub fn find_repository(&self, url_or_name: &str) -> Result<Repository> {
        if let Some(repo) = self.registry().get_repository(url_or_name)? {
            return Ok(repo);
        }
        self.registry()
            .get_repository_by_name(url_or_name)?
            .ok_or_else(|| Error::not_found("Repository", url_or_name))
    }

    /// Drop a repository, the packages of its group and its clone.
    pub fn remove_repository(&self, url_or_name: &str) -> Result<Repository> {
        let repo = self.find_repository(url_or_name)?;
        let removed = self.tools.remove_group(&repo.name)?;
        if !self.repos.remove_repo(&repo.location.to_string_lossy())? {
            warn!(location = %repo.location.display(), "repository clone already gone");
        }
        self.registry().delete_repository(&repo.url)?;
        info!(repo = %repo.name, packages = removed.len(), "repository removed");
        Ok(repo)
    }

    /// Update the clone and re-import its packages when `HEAD` moved.
    ///
    /// `force` re-imports even when nothing changed. Packages registered as
    /// inactive are left untouched.
    pub fn sync_repository(&self, repo: &Repository, force: bool) -> Result<RepositorySyncReport> {
        let outcome = self
            .repos
            .sync_repo(&repo.location.to_string_lossy(), repo.branch.as_deref())?;

        let import = if outcome.changed || force {
            Some(self.reimport(&repo.name, &outcome.path)?)
        } else {
            debug!(repo = %repo.name, "no upstream changes");
            None
        };

        self.registry().update_repository(
            &repo.url,
            &RepositoryUpdate {
                branch: outcome.branch.clone().map(Some),
                location: Some(outcome.path.clone()),
                ..RepositoryUpdate::default()
            },
        )?;

        Ok(RepositorySyncReport {
            name: repo.name.clone(),
            url: repo.url.clone(),
            path: outcome.path,
            branch: outcome.branch,
            changed: outcome.changed,
            import,
        })
    }

    fn reimport(&self, group: &str, path: &Path) -> Result<ImportReport> {
        let registry = self.registry();
        self.tools.import_with(path, Some(group), true, |preview| {
            match registry.get_package(&preview.command)? {
                Some(existing) if !existing.active => Ok(ImportDecision::Skip),
                _ => Ok(ImportDecision::Import),
            }
        })
    }

    /// Sync the repositories matching `filter` one after another.
    pub fn sync_repositories(&self, filter: &RepositoryFilter, force: bool) -> Result<BatchSyncReport> {
        let mut report = BatchSyncReport::default();
        for repo in self.registry().list_repositories(filter)? {
            match self.sync_repository(&repo, force) {
                Ok(synced) => report.synced.push(synced),
                Err(error) => report.failures.push(failure(&repo, error)),
            }
        }
        Ok(report)
    }

    /// Sync every `auto_sync` repository concurrently.
    pub async fn sync_all_auto_sync(&self, force: bool) -> Result<BatchSyncReport> {
        let repos = self
            .registry()
            .list_repositories(&RepositoryFilter::new().with_auto_sync(true))?;
        info!(count = repos.len(), "syncing auto-sync repositories");
        Ok(self.sync_concurrently(repos, force).await)
    }

    /// Sync `repos` on a bounded pool of blocking workers.
    ///
    /// A failing repository is reported and never stops the others.
    pub async fn sync_concurrently(&self, repos: Vec<Repository>, force: bool) -> BatchSyncReport {
        if repos.is_empty() {
            return BatchSyncReport::default();
        }

        let semaphore = Arc::new(Semaphore::new(worker_limit(repos.len())));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        for repo in repos {
            let orchestrator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let worker_repo = repo.clone();
            let handle = tasks.spawn(async move {
                orchestrator.run_worker(worker_repo, force, semaphore).await
            });
            pending.insert(handle.id(), repo);
        }
        collect_batch(tasks, pending).await
    }

    async fn run_worker(
        self,
        repo: Repository,
        force: bool,
        semaphore: Arc<Semaphore>,
    ) -> Result<RepositorySyncReport> {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| Error::repo_sync(&repo.url, e))?;
        let url = repo.url.clone();
        tokio::task::spawn_blocking(move || self.sync_repository(&repo, force))
            .await
            .map_err(|e| Error::repo_sync(url, e))?
    }
}

/// Drain `tasks`, attributing every outcome (panics and aborts included) to
/// the repository its task was spawned for.
async fn collect_batch(
    mut tasks: JoinSet<Result<RepositorySyncReport>>,
    mut pending: HashMap<task::Id, Repository>,
) -> BatchSyncReport {
    let mut report = BatchSyncReport::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let Some(repo) = pending.remove(&id) else {
            warn!(task = %id, "sync task without a repository");
            continue;
        };
        let outcome = match joined {
            Ok((_, outcome)) => outcome,
            Err(e) => Err(Error::repo_sync(&repo.url, e)),
        };
        match outcome {
            Ok(synced) => report.synced.push(synced),
            Err(error) => {
                warn!(repo = %repo.name, error = %error, "repository sync failed");
                report.failures.push(failure(&repo, error));
            }
        }
    }
    report.synced.sort_by(|a, b| a.name.cmp(&b.name));
    report.failures.sort_by(|a, b| a.name.cmp(&b.name));
    report
}

fn failure(repo: &Repository, error: Error) -> RepositoryFailure {
    RepositoryFailure {
        name: repo.name.clone(),
        url: repo.url.clone(),
        error,
    }
}

/// Worker count: one per repository, capped at twice the available cores.
fn worker_limit(repo_count: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    repo_count.min(cores * 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Platform, Scope};
    use tempfile::TempDir;

    fn orchestrator(temp: &TempDir) -> SyncOrchestrator {
        let registry = Registry::open(Scope::User, temp.path()).unwrap();
        SyncOrchestrator::new(ToolService::for_registry(registry, Platform::current()))
    }

    #[test]
    fn worker_limit_is_bounded() {
        assert_eq!(worker_limit(1), 1);
        assert_eq!(worker_limit(0), 1);
        assert!(worker_limit(10_000) < 10_000);
    }

    #[test]
    fn unknown_repository_is_not_found() {
        let temp = TempDir::new().unwrap();
        let sync = orchestrator(&temp);
        assert!(matches!(
            sync.remove_repository("nope"),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn batch_without_repositories_is_empty() {
        let temp = TempDir::new().unwrap();
        let sync = orchestrator(&temp);
        let report = sync.sync_all_auto_sync(false).await.unwrap();
        assert!(report.synced.is_empty());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_clone_is_collected_as_failure() {
        let temp = TempDir::new().unwrap();
        let sync = orchestrator(&temp);
        let gone = Repository::new("https://example.com/gone.git", "gone", temp.path().join("repos/gone"))
            .with_auto_sync(true);
        sync.registry().add_repository(&gone).unwrap();

        let report = sync.sync_all_auto_sync(false).await.unwrap();
        assert!(report.synced.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, Error::RepoNotFound { .. }));
    }

    #[tokio::test]
    async fn panicked_worker_is_reported_for_its_repository() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::new("https://example.com/boom.git", "boom", temp.path().join("repos/boom"));

        let mut tasks: JoinSet<Result<RepositorySyncReport>> = JoinSet::new();
        let handle = tasks.spawn(async { panic!("worker blew up") });
        let mut pending = HashMap::new();
        pending.insert(handle.id(), repo);

        let report = collect_batch(tasks, pending).await;
        assert!(report.synced.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "boom");
        assert!(matches!(report.failures[0].error, Error::RepoSync { .. }));
    }
}
