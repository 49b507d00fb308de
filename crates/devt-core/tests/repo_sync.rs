mod support;

use std::path::Path;

use devt_core::Error;
use devt_core::sync::SyncOrchestrator;
use devt_core::types::Scope;
use tempfile::TempDir;

use support::git::{commit_all, head_of, init_origin};
use support::{tool_service, write_package};

fn orchestrator(home: &Path) -> SyncOrchestrator {
    SyncOrchestrator::new(tool_service(Scope::User, home))
}

fn url_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn add_clones_and_imports_under_the_repository_name() {
    let temp = TempDir::new().unwrap();
    let origin_dir = temp.path().join("origins/toolbox");
    let origin = init_origin(&origin_dir);
    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo alpha");
    commit_all(&origin, "initial");

    let sync = orchestrator(&temp.path().join("home"));
    let url = url_of(&origin_dir);
    let report = sync.add_repository(&url, None, None, true, false).unwrap();

    assert_eq!(report.name, "toolbox");
    assert!(report.changed);
    assert_eq!(report.imported().len(), 1);
    assert_eq!(report.path, sync.repos().repos_dir().join("toolbox"));
    assert_eq!(head_of(&report.path), head_of(&origin_dir));

    let package = sync.tools().info("alpha").unwrap();
    assert_eq!(package.group, "toolbox");

    let repo = sync.find_repository("toolbox").unwrap();
    assert_eq!(repo.url, url);
    assert!(repo.auto_sync);
    assert_eq!(repo.branch, report.branch);

    let err = sync.add_repository(&url, None, None, true, false).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }), "{err}");
}

#[test]
fn sync_discards_local_edits_and_tracks_upstream() {
    let temp = TempDir::new().unwrap();
    let origin_dir = temp.path().join("origins/toolbox");
    let origin = init_origin(&origin_dir);
    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo one");
    commit_all(&origin, "initial");

    let sync = orchestrator(&temp.path().join("home"));
    let added = sync
        .add_repository(&url_of(&origin_dir), None, None, true, false)
        .unwrap();

    // Local edits in the clone are thrown away.
    let manifest = added.path.join("alpha/manifest.yaml");
    std::fs::write(&manifest, "name: broken\n").unwrap();
    let repo = sync.find_repository("toolbox").unwrap();
    let first = sync.sync_repository(&repo, false).unwrap();
    assert!(!first.changed);
    assert!(first.import.is_none());
    assert!(std::fs::read_to_string(&manifest).unwrap().contains("echo one"));

    let second = sync.sync_repository(&repo, false).unwrap();
    assert!(!second.changed);

    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo two");
    commit_all(&origin, "bump alpha");
    let third = sync.sync_repository(&repo, false).unwrap();
    assert!(third.changed);
    assert_eq!(third.imported().len(), 1);
    assert_eq!(head_of(&added.path), head_of(&origin_dir));

    let package = sync.tools().info("alpha").unwrap();
    assert_eq!(package.script("install").unwrap().args.joined(), "echo two");
}

#[test]
fn forced_sync_reimports_without_upstream_changes() {
    let temp = TempDir::new().unwrap();
    let origin_dir = temp.path().join("origins/toolbox");
    let origin = init_origin(&origin_dir);
    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo one");
    commit_all(&origin, "initial");

    let sync = orchestrator(&temp.path().join("home"));
    sync.add_repository(&url_of(&origin_dir), None, None, false, false)
        .unwrap();
    let repo = sync.find_repository("toolbox").unwrap();

    let report = sync.sync_repository(&repo, true).unwrap();
    assert!(!report.changed);
    assert_eq!(report.imported().len(), 1);
}

#[test]
fn inactive_packages_survive_a_resync() {
    let temp = TempDir::new().unwrap();
    let origin_dir = temp.path().join("origins/toolbox");
    let origin = init_origin(&origin_dir);
    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo one");
    write_package(&origin_dir.join("beta"), "beta", "beta", "echo one");
    commit_all(&origin, "initial");

    let sync = orchestrator(&temp.path().join("home"));
    sync.add_repository(&url_of(&origin_dir), None, None, true, false)
        .unwrap();
    sync.tools().set_active("beta", false).unwrap();

    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo two");
    write_package(&origin_dir.join("beta"), "beta", "beta", "echo two");
    commit_all(&origin, "bump both");

    let repo = sync.find_repository("toolbox").unwrap();
    let report = sync.sync_repository(&repo, false).unwrap();
    let import = report.import.as_ref().unwrap();
    assert_eq!(import.skipped, vec!["beta".to_string()]);

    let beta = sync.tools().info("beta").unwrap();
    assert!(!beta.active);
    assert_eq!(beta.script("install").unwrap().args.joined(), "echo one");
    let alpha = sync.tools().info("alpha").unwrap();
    assert_eq!(alpha.script("install").unwrap().args.joined(), "echo two");
}

#[test]
fn remove_drops_clone_row_and_group() {
    let temp = TempDir::new().unwrap();
    let origin_dir = temp.path().join("origins/toolbox");
    let origin = init_origin(&origin_dir);
    write_package(&origin_dir.join("alpha"), "alpha", "alpha", "echo one");
    commit_all(&origin, "initial");

    let sync = orchestrator(&temp.path().join("home"));
    let added = sync
        .add_repository(&url_of(&origin_dir), Some("kit"), None, true, false)
        .unwrap();
    assert_eq!(sync.tools().info("alpha").unwrap().group, "kit");

    let removed = sync.remove_repository("kit").unwrap();
    assert_eq!(removed.name, "kit");
    assert!(!added.path.exists());
    assert!(sync.tools().info("alpha").unwrap_err().is_not_found());
    assert!(sync.find_repository("kit").unwrap_err().is_not_found());
    assert!(origin_dir.join("alpha/manifest.yaml").is_file());
}
