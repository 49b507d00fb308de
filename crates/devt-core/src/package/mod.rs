//! Packages: a manifest plus its resolved scripts, installed under a group.

mod archive;
pub mod builder;
pub mod manager;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use archive::{create_zip, extract_zip};
pub use builder::PackageBuilder;
pub use manager::{ImportDecision, ImportFailure, ImportReport, PackageManager, discover_package_dirs};

use crate::error::{Error, Result};
use crate::manifest::Node;
use crate::script::{self, Script, ScriptRun};
use crate::types::Platform;

/// Group used when none is given.
pub const DEFAULT_GROUP: &str = "default";

/// An installed package as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Unique identifier within a scope.
    pub command: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute path of the package directory.
    pub location: PathBuf,
    #[serde(default)]
    pub dependencies: Node,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub install_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Script>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_active() -> bool {
    true
}

impl Package {
    pub fn script(&self, name: &str) -> Result<&Script> {
        self.scripts.get(name).ok_or_else(|| Error::ScriptNotFound {
            script: name.to_string(),
            tool: self.name.clone(),
            available: self.scripts.keys().cloned().collect(),
        })
    }

    /// Run one of the package's scripts from its install location.
    pub fn run_script(
        &self,
        name: &str,
        extra_args: &[String],
        platform: Platform,
    ) -> Result<ScriptRun> {
        let script = self.script(name)?;
        script::execute(script, &self.location, extra_args, platform)
    }
}
