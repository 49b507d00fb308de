#![cfg(unix)]

use devt_core::Error;
use devt_core::script::{CommandLine, Script, execute};
use devt_core::types::Platform;
use tempfile::TempDir;

fn captured(text: &str) -> Script {
    let mut script = Script::new(CommandLine::Text(text.into()));
    script.options.capture_output = true;
    script
}

#[test]
fn captures_output_and_appends_extra_args() {
    let temp = TempDir::new().unwrap();
    let run = execute(
        &captured("echo hello"),
        temp.path(),
        &["world".to_string()],
        Platform::current(),
    )
    .unwrap();

    assert_eq!(run.status, 0);
    assert_eq!(run.stdout.as_deref(), Some("hello world\n"));
    assert!(!run.used_fallback);
    assert_eq!(run.working_dir, temp.path().canonicalize().unwrap());
}

#[test]
fn runs_in_the_script_working_directory_with_its_env() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("bin")).unwrap();
    let script = captured("sh -c 'echo $DEVT_GREETING; pwd'")
        .with_cwd("bin")
        .with_env("DEVT_GREETING", "hi");

    let run = execute(&script, temp.path(), &[], Platform::current()).unwrap();
    let stdout = run.stdout.unwrap();
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("hi"));
    let pwd = std::path::PathBuf::from(lines.next().unwrap());
    assert_eq!(
        pwd.canonicalize().unwrap(),
        temp.path().join("bin").canonicalize().unwrap()
    );
}

#[test]
fn missing_program_fails_through_the_shell_not_the_launcher() {
    let temp = TempDir::new().unwrap();
    let err = execute(
        &captured("devt-definitely-missing-program --flag"),
        temp.path(),
        &[],
        Platform::current(),
    )
    .unwrap_err();

    match err {
        Error::CommandExecution {
            command, returncode, ..
        } => {
            assert_ne!(returncode, 0);
            assert!(command.contains(" -c "), "{command}");
            assert!(command.contains("devt-definitely-missing-program"));
        }
        other => panic!("expected a command failure, got {other}"),
    }
}

#[test]
fn non_zero_exit_reports_status_and_output() {
    let temp = TempDir::new().unwrap();
    let err = execute(
        &captured("sh -c 'echo partial; exit 3'"),
        temp.path(),
        &[],
        Platform::current(),
    )
    .unwrap_err();

    match err {
        Error::CommandExecution {
            returncode, stdout, ..
        } => {
            assert_eq!(returncode, 3);
            assert_eq!(stdout.as_deref(), Some("partial\n"));
        }
        other => panic!("expected a command failure, got {other}"),
    }
}

#[test]
fn working_directory_outside_the_package_is_rejected() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("pkg");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(temp.path().join("elsewhere")).unwrap();

    let script = captured("echo nope").with_cwd("../elsewhere");
    let err = execute(&script, &root, &[], Platform::current()).unwrap_err();
    assert!(matches!(err, Error::WorkingDirectory { .. }), "{err}");
}

#[test]
fn explicit_shell_receives_the_joined_command() {
    let temp = TempDir::new().unwrap();
    let script = captured("echo $((1 + 2))").with_shell(CommandLine::Text("sh -c".into()));

    let run = execute(&script, temp.path(), &[], Platform::current()).unwrap();
    assert_eq!(run.invocation.program, "sh");
    assert_eq!(run.stdout.as_deref(), Some("3\n"));
}

#[test]
fn failing_shell_wrapper_falls_back_to_raw_tokens() {
    let temp = TempDir::new().unwrap();
    let script = captured("echo hi").with_shell(CommandLine::Text("false".into()));

    let run = execute(&script, temp.path(), &[], Platform::current()).unwrap();
    assert_eq!(run.status, 0);
    assert!(run.used_fallback);
    assert_eq!(run.invocation.program, "echo");
    assert_eq!(run.stdout.as_deref(), Some("hi\n"));
}
