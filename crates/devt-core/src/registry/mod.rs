//! Durable per-scope store of packages, scripts and repositories.
//!
//! Every call opens its own SQLite connection (WAL journal, busy timeout), so
//! a [`Registry`] is a cheap path handle that can be cloned into worker
//! threads. Mutations run inside one `BEGIN IMMEDIATE` transaction and roll
//! back on error.

mod packages;
mod repositories;
mod schema;
mod scripts;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

pub use packages::{PackageFilter, PackageUpdate};
pub use repositories::{Repository, RepositoryFilter, RepositoryUpdate};
pub use schema::SCHEMA_VERSION;

use crate::error::{IoContext, Result};
use crate::types::Scope;

/// File name of the registry database inside a scope root.
pub const REGISTRY_FILE: &str = "registry.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle on the registry of one scope.
#[derive(Debug, Clone)]
pub struct Registry {
    scope: Scope,
    root: PathBuf,
    db_path: PathBuf,
}

impl Registry {
    /// Open (creating when needed) the registry stored under `root`.
    pub fn open(scope: Scope, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .io_context(|| format!("Failed to create scope root: {}", root.display()))?;
        let registry = Self {
            scope,
            db_path: root.join(REGISTRY_FILE),
            root,
        };
        let conn = registry.connection()?;
        schema::init_schema(&conn)?;
        debug!(scope = %scope, db = %registry.db_path.display(), "registry opened");
        Ok(registry)
    }

    /// True when a registry database already exists under `root`.
    pub fn exists(root: &Path) -> bool {
        root.join(REGISTRY_FILE).is_file()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Directory holding installed packages of this scope.
    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    /// Directory holding repository clones of this scope.
    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run `f` inside an immediate transaction; commit on success.
    fn with_immediate_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        f(&conn)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database_and_layout_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("scope");
        assert!(!Registry::exists(&root));

        let registry = Registry::open(Scope::User, &root).unwrap();
        assert!(Registry::exists(&root));
        assert_eq!(registry.scope(), Scope::User);
        assert_eq!(registry.tools_dir(), root.join("tools"));
        assert_eq!(registry.repos_dir(), root.join("repos"));

        // Reopening keeps existing data.
        Registry::open(Scope::User, &root).unwrap();
    }
}
