//! Shared core types used across the registry, resolver and sync layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Storage partition a registry instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Per-user store shared by every workspace.
    User,
    /// Store living inside the current workspace.
    Workspace,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Workspace, Scope::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Workspace => "workspace",
        }
    }

    pub fn other(self) -> Scope {
        match self {
            Scope::User => Scope::Workspace,
            Scope::Workspace => Scope::User,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "u" => Ok(Scope::User),
            "workspace" | "ws" | "w" => Ok(Scope::Workspace),
            other => Err(Error::Config(format!(
                "invalid scope '{}': use 'user' or 'workspace'",
                other
            ))),
        }
    }
}

/// Which scopes a lookup should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeSelector {
    Only(Scope),
    /// Workspace first, then user.
    #[default]
    Both,
}

impl ScopeSelector {
    pub fn scopes(self) -> Vec<Scope> {
        match self {
            ScopeSelector::Only(scope) => vec![scope],
            ScopeSelector::Both => Scope::ALL.to_vec(),
        }
    }
}

impl FromStr for ScopeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both" | "all" => Ok(ScopeSelector::Both),
            other => other.parse().map(ScopeSelector::Only),
        }
    }
}

/// Operating system family used for manifest branches and shell selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Key of the OS branch in manifests.
    pub fn key(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Posix => "posix",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scope_aliases() {
        assert_eq!("user".parse::<Scope>().unwrap(), Scope::User);
        assert_eq!("Workspace".parse::<Scope>().unwrap(), Scope::Workspace);
        assert!("global".parse::<Scope>().is_err());
    }

    #[test]
    fn selector_both_checks_workspace_first() {
        let selector: ScopeSelector = "both".parse().unwrap();
        assert_eq!(selector.scopes(), vec![Scope::Workspace, Scope::User]);
        let only: ScopeSelector = "user".parse().unwrap();
        assert_eq!(only.scopes(), vec![Scope::User]);
    }

    #[test]
    fn platform_keys_match_manifest_branches() {
        assert_eq!(Platform::Windows.key(), "windows");
        assert_eq!(Platform::Posix.key(), "posix");
    }
}
