//! Package manifests: parsing, validation and per-OS script resolution.

mod loader;
mod merge;
mod node;
mod resolve;

use std::path::{Path, PathBuf};

pub use loader::{
    MANIFEST_CANDIDATES, ManifestFormat, find_manifest, is_manifest_file, load_from_dir,
    load_manifest, parse_document, strip_json_comments,
};
pub use merge::merge_maps;
pub use node::{Map, Node, Scalar};
pub use resolve::{resolve_script, script_names};

use crate::error::{Error, Result};

/// Keys holding per-OS script branches.
pub const OS_KEYS: [&str; 2] = ["windows", "posix"];

/// Keys describing how a script is launched.
pub const SCRIPT_FIELDS: [&str; 4] = ["args", "shell", "cwd", "env"];

/// Launch options forwarded to the process builder.
pub const LAUNCH_OPTIONS: [&str; 6] = [
    "capture_output",
    "input",
    "stdin",
    "stdout",
    "stderr",
    "clear_env",
];

/// True for keys that can never name a script.
pub fn is_reserved_key(key: &str) -> bool {
    OS_KEYS.contains(&key) || SCRIPT_FIELDS.contains(&key) || LAUNCH_OPTIONS.contains(&key)
}

/// A validated manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// File the manifest was read from.
    pub path: PathBuf,
    pub name: String,
    pub command: String,
    pub description: String,
    pub dependencies: Node,
    /// Top-level launch defaults (`cwd`, `env`, `shell` and launch options).
    pub defaults: Map,
    pub scripts: Map,
}

impl Manifest {
    /// Build a manifest from a parsed document, enforcing the required keys.
    pub fn from_document(document: Map, path: &Path) -> Result<Self> {
        let invalid = |reason: &str| Error::ManifestInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let name = required_string(&document, "name").ok_or_else(|| invalid("missing 'name'"))?;
        let command =
            required_string(&document, "command").ok_or_else(|| invalid("missing 'command'"))?;
        let scripts = match document.get("scripts") {
            Some(Node::Map(scripts)) if !scripts.is_empty() => scripts.clone(),
            Some(Node::Map(_)) | None => return Err(invalid("missing 'scripts'")),
            Some(_) => return Err(invalid("'scripts' must be a mapping")),
        };
        if !defines_install(&scripts) {
            return Err(invalid(
                "'install' script must be defined generically or under an OS branch",
            ));
        }

        let description = match document.get("description") {
            Some(node) => node.scalar_text().unwrap_or_default(),
            None => String::new(),
        };
        let dependencies = match document.get("dependencies") {
            Some(node) if node.is_null() => Node::empty_map(),
            Some(node) => node.clone(),
            None => Node::empty_map(),
        };
        let defaults = document
            .iter()
            .filter(|(key, _)| is_launch_default(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            command,
            description,
            dependencies,
            defaults,
            scripts,
        })
    }

    /// Directory containing the manifest.
    pub fn package_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn is_launch_default(key: &str) -> bool {
    key != "args" && (SCRIPT_FIELDS.contains(&key) || LAUNCH_OPTIONS.contains(&key))
}

fn required_string(document: &Map, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(Node::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn defines_install(scripts: &Map) -> bool {
    scripts.contains_key("install")
        || OS_KEYS.iter().any(|os| {
            scripts
                .get(*os)
                .and_then(Node::as_map)
                .is_some_and(|branch| branch.contains_key("install"))
        })
}
