//! Resolved scripts and how they are turned into processes.

mod command;
mod exec;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use command::{
    Invocation, ProgramLocator, SearchPath, build_command, build_command_with, display_line,
    is_sandboxed_toolchain,
};
pub use exec::{ScriptRun, execute, execute_with, resolve_working_dir};

use crate::error::{Error, Result};
use crate::manifest::{LAUNCH_OPTIONS, Map, Node};

/// Command text as written in a manifest: one string or a token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Text(String),
    Tokens(Vec<String>),
}

impl CommandLine {
    pub fn from_node(node: &Node) -> Option<Self> {
        if let Some(text) = node.as_str() {
            return Some(Self::Text(text.to_string()));
        }
        node.as_str_list().map(Self::Tokens)
    }

    /// The `""` shell sentinel: run the raw tokens without a wrapper.
    pub fn is_unwrapped(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    /// Single-string form; token lists are joined with spaces.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Tokens(tokens) => tokens.join(" "),
        }
    }

    /// Shell-style tokens. Token lists are returned unchanged.
    pub fn tokens(&self) -> Result<Vec<String>> {
        match self {
            Self::Text(text) => {
                shlex::split(text).ok_or_else(|| Error::InvalidCommandLine(text.clone()))
            }
            Self::Tokens(tokens) => Ok(tokens.clone()),
        }
    }
}

/// How a standard stream of the child process is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    Inherit,
    Pipe,
    Null,
}

/// Allow-listed process launch options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub capture_output: bool,
    /// Text written to the child's stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<StdioMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<StdioMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<StdioMode>,
    /// Start from an empty environment instead of inheriting it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_env: bool,
}

/// An OS-independent, fully resolved script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub args: CommandLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<CommandLine>,
    /// Working directory relative to the package root.
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub options: LaunchOptions,
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

impl Script {
    pub fn new(args: CommandLine) -> Self {
        Self {
            args,
            shell: None,
            cwd: default_cwd(),
            env: BTreeMap::new(),
            options: LaunchOptions::default(),
        }
    }

    pub fn with_shell(mut self, shell: CommandLine) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build a script from a merged manifest configuration.
    ///
    /// Returns `Ok(None)` when the configuration has no `args`.
    pub fn from_config(config: &Map, manifest_path: &Path) -> Result<Option<Self>> {
        let invalid = |reason: String| Error::ManifestInvalid {
            path: manifest_path.to_path_buf(),
            reason,
        };

        let Some(args_node) = config.get("args").filter(|node| !node.is_null()) else {
            return Ok(None);
        };
        let args = CommandLine::from_node(args_node)
            .ok_or_else(|| invalid("'args' must be a string or a list of strings".to_string()))?;

        let shell = match config.get("shell") {
            None => None,
            Some(node) if node.is_null() => None,
            Some(node) => Some(CommandLine::from_node(node).ok_or_else(|| {
                invalid("'shell' must be a string or a list of strings".to_string())
            })?),
        };

        let cwd = match config.get("cwd") {
            None => default_cwd(),
            Some(node) if node.is_null() => default_cwd(),
            Some(node) => node
                .as_str()
                .map(PathBuf::from)
                .ok_or_else(|| invalid("'cwd' must be a string".to_string()))?,
        };

        let mut env = BTreeMap::new();
        match config.get("env") {
            None => {}
            Some(node) if node.is_null() => {}
            Some(Node::Map(vars)) => {
                for (key, value) in vars {
                    if value.is_null() {
                        continue;
                    }
                    let text = value
                        .scalar_text()
                        .ok_or_else(|| invalid(format!("env value for '{}' must be a scalar", key)))?;
                    env.insert(key.clone(), text);
                }
            }
            Some(_) => return Err(invalid("'env' must be a mapping".to_string())),
        }

        let option_map: Map = config
            .iter()
            .filter(|(key, _)| LAUNCH_OPTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let options = serde_json::to_value(&option_map)
            .and_then(serde_json::from_value::<LaunchOptions>)
            .map_err(|e| invalid(format!("invalid launch options: {}", e)))?;

        Ok(Some(Self {
            args,
            shell,
            cwd,
            env,
            options,
        }))
    }
}
