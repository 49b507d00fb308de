//! Launching resolved scripts inside their package directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Platform;

use super::command::{Invocation, ProgramLocator, SearchPath, build_command_with, display_line};
use super::{CommandLine, Script, StdioMode};

/// Outcome of a successful script run.
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub invocation: Invocation,
    pub working_dir: PathBuf,
    pub status: i32,
    /// Captured output when `capture_output` or a piped stream was requested.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// The raw-token retry was needed.
    pub used_fallback: bool,
}

/// Resolve the script's working directory and keep it inside `package_root`.
pub fn resolve_working_dir(script: &Script, package_root: &Path) -> Result<PathBuf> {
    let root = package_root
        .canonicalize()
        .map_err(|e| Error::WorkingDirectory {
            path: package_root.to_path_buf(),
            reason: format!("package root is not accessible: {}", e),
        })?;
    let candidate = if script.cwd.is_absolute() {
        script.cwd.clone()
    } else {
        root.join(&script.cwd)
    };
    if !candidate.exists() {
        return Err(Error::WorkingDirectory {
            path: candidate,
            reason: "does not exist".to_string(),
        });
    }
    let resolved = candidate
        .canonicalize()
        .map_err(|e| Error::WorkingDirectory {
            path: candidate.clone(),
            reason: e.to_string(),
        })?;
    if !resolved.is_dir() {
        return Err(Error::WorkingDirectory {
            path: resolved,
            reason: "is not a directory".to_string(),
        });
    }
    if !resolved.starts_with(&root) {
        return Err(Error::WorkingDirectory {
            path: resolved,
            reason: format!("escapes the package root {}", root.display()),
        });
    }
    Ok(resolved)
}

/// Run `script` from `package_root`, looking programs up on `PATH`.
pub fn execute(
    script: &Script,
    package_root: &Path,
    extra_args: &[String],
    platform: Platform,
) -> Result<ScriptRun> {
    execute_with(script, package_root, extra_args, platform, &SearchPath)
}

/// Run `script`, retrying once with raw tokens when the first attempt fails.
///
/// No retry happens when the raw-token invocation is the one that just ran.
pub fn execute_with(
    script: &Script,
    package_root: &Path,
    extra_args: &[String],
    platform: Platform,
    locator: &dyn ProgramLocator,
) -> Result<ScriptRun> {
    let working_dir = resolve_working_dir(script, package_root)?;

    let invocation = build_command_with(script, extra_args, platform, locator)?;
    let first = run_once(&invocation, &working_dir, script, platform);
    if matches!(&first, Ok(run) if run.status == 0) {
        return first;
    }

    let unwrapped = script.clone().with_shell(CommandLine::Text(String::new()));
    let retry = build_command_with(&unwrapped, extra_args, platform, locator)?;
    if retry == invocation {
        return first.and_then(into_failure);
    }

    match &first {
        Ok(run) => warn!(
            command = %display_line(&run.invocation.tokens(), platform),
            status = run.status,
            "command failed, retrying without a shell wrapper"
        ),
        Err(e) => warn!(error = %e, "command could not start, retrying without a shell wrapper"),
    }

    match run_once(&retry, &working_dir, &unwrapped, platform) {
        Ok(mut second) => {
            second.used_fallback = true;
            into_failure(second)
        }
        Err(e) => {
            debug!(error = %e, "fallback could not start");
            first.and_then(into_failure)
        }
    }
}

fn into_failure(run: ScriptRun) -> Result<ScriptRun> {
    if run.status == 0 {
        return Ok(run);
    }
    Err(Error::CommandExecution {
        command: run.invocation.tokens().join(" "),
        returncode: run.status,
        stdout: run.stdout,
        stderr: run.stderr,
    })
}

fn run_once(
    invocation: &Invocation,
    working_dir: &Path,
    script: &Script,
    platform: Platform,
) -> Result<ScriptRun> {
    info!(
        cwd = %working_dir.display(),
        "running: {}",
        display_line(&invocation.tokens(), platform)
    );

    let options = &script.options;
    let mut command = Command::new(&invocation.program);
    command.args(&invocation.args).current_dir(working_dir);
    if options.clear_env {
        command.env_clear();
    }
    command.envs(&script.env);

    let stdin = if options.input.is_some() {
        Stdio::piped()
    } else {
        stdio(options.stdin, false)
    };
    command
        .stdin(stdin)
        .stdout(stdio(options.stdout, options.capture_output))
        .stderr(stdio(options.stderr, options.capture_output));

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: invocation.program.clone(),
        source,
    })?;

    if let Some(input) = &options.input {
        if let Some(mut pipe) = child.stdin.take() {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                debug!(error = %e, "child closed stdin early");
            }
        }
    }

    let output = child.wait_with_output().map_err(|source| Error::Spawn {
        program: invocation.program.clone(),
        source,
    })?;
    let captured = |bytes: &[u8], mode: Option<StdioMode>| {
        let piped = options.capture_output || mode == Some(StdioMode::Pipe);
        piped.then(|| String::from_utf8_lossy(bytes).into_owned())
    };

    Ok(ScriptRun {
        invocation: invocation.clone(),
        working_dir: working_dir.to_path_buf(),
        status: output.status.code().unwrap_or(-1),
        stdout: captured(&output.stdout, options.stdout),
        stderr: captured(&output.stderr, options.stderr),
        used_fallback: false,
    })
}

fn stdio(mode: Option<StdioMode>, capture: bool) -> Stdio {
    if capture {
        return Stdio::piped();
    }
    match mode {
        Some(StdioMode::Pipe) => Stdio::piped(),
        Some(StdioMode::Null) => Stdio::null(),
        Some(StdioMode::Inherit) | None => Stdio::inherit(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn working_dir_defaults_to_package_root() {
        let temp = TempDir::new().unwrap();
        let script = Script::new(CommandLine::Text("echo".into()));
        let dir = resolve_working_dir(&script, temp.path()).unwrap();
        assert_eq!(dir, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn working_dir_must_stay_inside_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("pkg");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(temp.path().join("outside")).unwrap();

        let inside = Script::new(CommandLine::Text("echo".into())).with_cwd("sub");
        assert!(resolve_working_dir(&inside, &root).is_ok());

        let escaping = Script::new(CommandLine::Text("echo".into())).with_cwd("../outside");
        let err = resolve_working_dir(&escaping, &root).unwrap_err();
        assert!(err.to_string().contains("escapes"), "{err}");

        let missing = Script::new(CommandLine::Text("echo".into())).with_cwd("nope");
        assert!(matches!(
            resolve_working_dir(&missing, &root),
            Err(Error::WorkingDirectory { .. })
        ));
    }

    #[test]
    fn file_is_not_a_working_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("file.txt"), "x").unwrap();
        let script = Script::new(CommandLine::Text("echo".into())).with_cwd("file.txt");
        let err = resolve_working_dir(&script, temp.path()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
