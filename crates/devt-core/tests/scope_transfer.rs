mod support;

use devt_core::Error;
use devt_core::transfer::{copy_package, move_package};
use devt_core::types::Scope;
use tempfile::TempDir;

use support::{tool_service, tools_dir, write_package};

#[test]
fn commands_are_unique_per_scope_only() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("fmt");
    write_package(&source, "fmt", "fmt", "echo fmt");
    let user = tool_service(Scope::User, &temp.path().join("home"));
    let workspace = tool_service(Scope::Workspace, &temp.path().join("project/.devt"));

    assert!(user.import(&source, Some("g"), false).unwrap().is_clean());
    assert!(workspace.import(&source, Some("g"), false).unwrap().is_clean());

    let in_user = user.info("fmt").unwrap();
    let in_workspace = workspace.info("fmt").unwrap();
    assert_ne!(in_user.location, in_workspace.location);
}

#[test]
fn move_leaves_the_tool_in_the_target_scope_only() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("lint");
    write_package(&source, "lint", "lint", "echo lint");
    let user = tool_service(Scope::User, &temp.path().join("home"));
    let workspace = tool_service(Scope::Workspace, &temp.path().join("project/.devt"));
    let original = user.import(&source, Some("checks"), false).unwrap().packages[0].clone();
    user.set_active("lint", false).unwrap();

    let moved = move_package(&user, &workspace, "lint", false).unwrap();
    assert_eq!(moved.group, "checks");
    assert!(!moved.active);
    assert!(moved.location.starts_with(tools_dir(&workspace)));

    assert!(user.info("lint").unwrap_err().is_not_found());
    assert!(!original.location.exists());
    assert!(moved.location.join("manifest.yaml").is_file());
}

#[test]
fn copy_refuses_an_existing_command_without_force() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("lint");
    write_package(&source, "lint", "lint", "echo lint");
    let user = tool_service(Scope::User, &temp.path().join("home"));
    let workspace = tool_service(Scope::Workspace, &temp.path().join("project/.devt"));
    user.import(&source, Some("checks"), false).unwrap();
    workspace.import(&source, Some("checks"), false).unwrap();

    let err = copy_package(&user, &workspace, "lint", false).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }), "{err}");

    let copied = copy_package(&user, &workspace, "lint", true).unwrap();
    assert_eq!(copied.command, "lint");
    assert!(user.info("lint").is_ok());
}

#[test]
fn copy_within_one_scope_is_rejected() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("lint");
    write_package(&source, "lint", "lint", "echo lint");
    let user = tool_service(Scope::User, &temp.path().join("home"));
    user.import(&source, Some("checks"), false).unwrap();

    let err = copy_package(&user, &user, "lint", true).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
