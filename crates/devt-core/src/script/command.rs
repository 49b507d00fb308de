//! Turning a resolved script into a concrete program invocation.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Platform;

use super::Script;

/// Directory names that mark a project-local toolchain.
const SANDBOX_DIRS: [&str; 3] = [".venv", "venv", "node_modules"];

/// A program and its argument vector, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        let mut tokens = tokens.into_iter();
        let program = tokens
            .next()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| Error::InvalidCommandLine("empty command".to_string()))?;
        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    pub fn tokens(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Resolves program names against the executable search path.
pub trait ProgramLocator {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// `PATH` lookup through the `which` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchPath;

impl ProgramLocator for SearchPath {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Build the invocation for `script` using the real search path.
pub fn build_command(script: &Script, extra_args: &[String], platform: Platform) -> Result<Invocation> {
    build_command_with(script, extra_args, platform, &SearchPath)
}

/// Build the invocation for `script` with a custom program locator.
pub fn build_command_with(
    script: &Script,
    extra_args: &[String],
    platform: Platform,
    locator: &dyn ProgramLocator,
) -> Result<Invocation> {
    let tokens = match &script.shell {
        Some(shell) if shell.is_unwrapped() => {
            let mut tokens = script.args.tokens()?;
            tokens.extend(extra_args.iter().cloned());
            tokens
        }
        Some(shell) => {
            let mut tokens = shell.tokens()?;
            tokens.push(script.args.joined());
            tokens.extend(extra_args.iter().cloned());
            tokens
        }
        None => {
            let args = script.args.tokens()?;
            let first = args
                .first()
                .ok_or_else(|| Error::InvalidCommandLine("empty command".to_string()))?;
            let needs_wrapper = match locator.locate(first) {
                Some(path) => is_sandboxed_toolchain(&path),
                None => true,
            };
            if needs_wrapper {
                debug!(program = %first, "wrapping command in the default shell");
                let mut command = script.args.joined();
                if !extra_args.is_empty() {
                    command.push(' ');
                    command.push_str(&display_line(extra_args, platform));
                }
                default_shell(&command, platform, locator)
            } else {
                let mut tokens = args;
                tokens.extend(extra_args.iter().cloned());
                tokens
            }
        }
    };
    Invocation::from_tokens(tokens)
}

/// True when `program` lives inside a project-local toolchain directory.
pub fn is_sandboxed_toolchain(program: &Path) -> bool {
    program.ancestors().skip(1).any(|dir| {
        let sandbox_name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| SANDBOX_DIRS.contains(&name));
        sandbox_name || dir.join("pyvenv.cfg").is_file()
    })
}

fn default_shell(command: &str, platform: Platform, locator: &dyn ProgramLocator) -> Vec<String> {
    match platform {
        Platform::Windows => {
            let exe = if locator.locate("pwsh").is_some() {
                "pwsh"
            } else {
                "powershell"
            };
            let body = if command.contains('\n') {
                format!("& {{\n{}\n}}", command)
            } else {
                format!("& {}", command)
            };
            vec![exe.to_string(), "-Command".to_string(), body]
        }
        Platform::Posix => {
            let exe = if locator.locate("bash").is_some() {
                "bash"
            } else {
                "sh"
            };
            vec![exe.to_string(), "-c".to_string(), command.to_string()]
        }
    }
}

/// Human-readable command line, quoted for the target platform.
pub fn display_line(tokens: &[String], platform: Platform) -> String {
    match platform {
        Platform::Windows => tokens
            .iter()
            .map(|token| quote_windows_arg(token))
            .collect::<Vec<_>>()
            .join(" "),
        Platform::Posix => shlex::try_join(tokens.iter().map(String::as_str))
            .unwrap_or_else(|_| tokens.join(" ")),
    }
}

/// MSVC runtime argument quoting.
fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut quoted = String::from("\"");
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.push_str(&"\\".repeat(backslashes));
                backslashes = 0;
                quoted.push(c);
            }
        }
    }
    quoted.push_str(&"\\".repeat(backslashes * 2));
    quoted.push('"');
    quoted
}
