//! Layered `config.toml` settings.
//!
//! Layers apply in order: built-in defaults, the user scope file, the
//! workspace scope file, then command-line overrides. A key left unset in a
//! layer keeps the value from the layer below.

pub mod paths;
pub mod store;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Scope;

pub use paths::{CONFIG_FILE, DEVT_HOME_ENV, default_user_root, workspace_root};
pub use store::ConfigStore;

/// Log filter used when no layer sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// One layer of settings as stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevtConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl DevtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(mut self, other: &DevtConfig) -> Self {
        if other.scope.is_some() {
            self.scope = other.scope;
        }
        if other.auto_sync.is_some() {
            self.auto_sync = other.auto_sync;
        }
        if other.log_level.is_some() {
            self.log_level.clone_from(&other.log_level);
        }
        self
    }

    /// Apply a `key=value` assignment as typed on the command line.
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("expected KEY=VALUE, got '{assignment}'")))?;
        let value = value.trim();
        match key.trim() {
            "scope" => self.scope = Some(Scope::from_str(value)?),
            "auto_sync" => {
                let flag = parse_bool(value)
                    .ok_or_else(|| Error::Config(format!("auto_sync must be true or false, got '{value}'")))?;
                self.auto_sync = Some(flag);
            }
            "log_level" => self.log_level = Some(value.to_string()),
            other => return Err(Error::Config(format!("unknown key '{other}'"))),
        }
        Ok(())
    }

    /// Fill every unset key with its default.
    pub fn resolve(&self) -> EffectiveConfig {
        EffectiveConfig {
            scope: self.scope.unwrap_or(Scope::User),
            auto_sync: self.auto_sync.unwrap_or(false),
            log_level: self
                .log_level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub scope: Scope,
    pub auto_sync: bool,
    pub log_level: String,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        DevtConfig::default().resolve()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
