//! Error taxonomy for devt operations.

use std::path::PathBuf;

/// Result alias used across the core crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Manifest file not found in {}", dir.display())]
    ManifestNotFound { dir: PathBuf },

    #[error("Invalid manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Failed to parse manifest {}: {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error(
        "Script '{script}' not found for tool '{tool}'. Available scripts: {}",
        available.join(", ")
    )]
    ScriptNotFound {
        script: String,
        tool: String,
        available: Vec<String>,
    },

    #[error("Command failed with exit code {returncode}: {command}")]
    CommandExecution {
        command: String,
        returncode: i32,
        stdout: Option<String>,
        stderr: Option<String>,
    },

    #[error("Cannot tokenize command line: {0}")]
    InvalidCommandLine(String),

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Working directory {}: {reason}", path.display())]
    WorkingDirectory { path: PathBuf, reason: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error(
        "'{name}' matches packages in several groups ({}); qualify it with a group",
        groups.join(", ")
    )]
    AmbiguousPackage { name: String, groups: Vec<String> },

    #[error("Package directory already exists: {}. Use --force to overwrite.", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Failed to sync repository '{identifier}': {cause}")]
    RepoSync { identifier: String, cause: String },

    #[error("Repository not found: {identifier}")]
    RepoNotFound { identifier: String },

    #[error("Unsupported source type: {}", path.display())]
    UnsupportedSource { path: PathBuf },

    #[error("Archive error for {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Registry storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            entity,
            key: key.into(),
        }
    }

    pub fn repo_sync(identifier: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::RepoSync {
            identifier: identifier.into(),
            cause: cause.to_string(),
        }
    }

    /// True for "the thing is not there" errors that callers may treat as absence.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::RepoNotFound { .. } | Self::ManifestNotFound { .. }
        )
    }
}

/// Attach a human-readable context to `std::io::Error` results.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_not_found_lists_available_scripts() {
        let err = Error::ScriptNotFound {
            script: "deploy".to_string(),
            tool: "My Tool".to_string(),
            available: vec!["install".to_string(), "test".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("'deploy'"));
        assert!(message.contains("My Tool"));
        assert!(message.contains("install, test"));
    }

    #[test]
    fn io_context_wraps_source() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = result.io_context(|| "Failed to read x").unwrap_err();
        assert_eq!(err.to_string(), "Failed to read x: gone");
    }

    #[test]
    fn not_found_helpers_are_classified() {
        assert!(Error::not_found("Package", "t1").is_not_found());
        assert!(!Error::duplicate("Package", "t1").is_not_found());
    }
}
