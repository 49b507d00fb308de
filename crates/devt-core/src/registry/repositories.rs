//! Repository rows keyed by URL.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Registry;

const ENTITY: &str = "Repository";

const COLUMNS: &str = "url, name, branch, location, auto_sync, install_date, last_update";

/// A tracked git repository whose packages form the group `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    pub name: String,
    pub branch: Option<String>,
    pub location: PathBuf,
    pub auto_sync: bool,
    pub install_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Repository {
    pub fn new(url: impl Into<String>, name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            name: name.into(),
            branch: None,
            location: location.into(),
            auto_sync: false,
            install_date: now,
            last_update: now,
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        let location: String = row.get("location")?;
        Ok(Self {
            url: row.get("url")?,
            name: row.get("name")?,
            branch: row.get("branch")?,
            location: PathBuf::from(location),
            auto_sync: row.get("auto_sync")?,
            install_date: row.get("install_date")?,
            last_update: row.get("last_update")?,
        })
    }
}

/// Filter for [`Registry::list_repositories`]. Set fields are AND-ed.
#[derive(Debug, Clone, Default)]
pub struct RepositoryFilter {
    /// Exact URL.
    pub url: Option<String>,
    pub name: Option<String>,
    pub branch: Option<String>,
    pub location: Option<String>,
    pub auto_sync: Option<bool>,
}

impl RepositoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = Some(auto_sync);
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(url) = &self.url {
            clauses.push("url = ?");
            values.push(Value::Text(url.clone()));
        }
        for (clause, needle) in [
            ("instr(name, ?) > 0", &self.name),
            ("instr(branch, ?) > 0", &self.branch),
            ("instr(location, ?) > 0", &self.location),
        ] {
            if let Some(needle) = needle {
                clauses.push(clause);
                values.push(Value::Text(needle.clone()));
            }
        }
        if let Some(auto_sync) = self.auto_sync {
            clauses.push("auto_sync = ?");
            values.push(Value::Integer(i64::from(auto_sync)));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Partial update for [`Registry::update_repository`].
#[derive(Debug, Clone, Default)]
pub struct RepositoryUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the branch.
    pub branch: Option<Option<String>>,
    pub location: Option<PathBuf>,
    pub auto_sync: Option<bool>,
}

fn select_repository(conn: &Connection, url: &str) -> Result<Option<Repository>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM repositories WHERE url = ?1"),
            params![url],
            Repository::read,
        )
        .optional()?)
}

fn insert_repository(conn: &Connection, repo: &Repository) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO repositories({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            repo.url,
            repo.name,
            repo.branch,
            repo.location.to_string_lossy(),
            repo.auto_sync,
            repo.install_date,
            repo.last_update,
        ],
    )?;
    Ok(())
}

fn write_repository(conn: &Connection, repo: &Repository) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET name = ?2, branch = ?3, location = ?4, auto_sync = ?5, \
         install_date = ?6, last_update = ?7 WHERE url = ?1",
        params![
            repo.url,
            repo.name,
            repo.branch,
            repo.location.to_string_lossy(),
            repo.auto_sync,
            repo.install_date,
            repo.last_update,
        ],
    )?;
    Ok(())
}

impl Registry {
    pub fn add_repository(&self, repo: &Repository) -> Result<()> {
        self.with_immediate_tx(|tx| {
            if select_repository(tx, &repo.url)?.is_some() {
                return Err(Error::duplicate(ENTITY, &repo.url));
            }
            insert_repository(tx, repo)
        })
    }

    /// Insert or replace a repository row, keeping an existing `install_date`.
    pub fn save_repository(&self, repo: &Repository) -> Result<Repository> {
        self.with_immediate_tx(|tx| {
            let mut stored = repo.clone();
            match select_repository(tx, &repo.url)? {
                Some(existing) => {
                    stored.install_date = existing.install_date;
                    stored.last_update = Utc::now();
                    write_repository(tx, &stored)?;
                }
                None => insert_repository(tx, &stored)?,
            }
            Ok(stored)
        })
    }

    pub fn get_repository(&self, url: &str) -> Result<Option<Repository>> {
        self.read(|conn| select_repository(conn, url))
    }

    /// First repository (oldest install) whose name is exactly `name`.
    pub fn get_repository_by_name(&self, name: &str) -> Result<Option<Repository>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM repositories WHERE name = ?1 \
                         ORDER BY install_date LIMIT 1"
                    ),
                    params![name],
                    Repository::read,
                )
                .optional()?)
        })
    }

    /// Repositories matching `filter`, ordered by name.
    pub fn list_repositories(&self, filter: &RepositoryFilter) -> Result<Vec<Repository>> {
        self.read(|conn| {
            let (clause, values) = filter.where_clause();
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM repositories{clause} ORDER BY name, url"
            ))?;
            let repos = stmt
                .query_map(params_from_iter(values.iter()), Repository::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(repos)
        })
    }

    pub fn update_repository(&self, url: &str, update: &RepositoryUpdate) -> Result<Repository> {
        self.with_immediate_tx(|tx| {
            let mut repo =
                select_repository(tx, url)?.ok_or_else(|| Error::not_found(ENTITY, url))?;
            if let Some(name) = &update.name {
                repo.name = name.clone();
            }
            if let Some(branch) = &update.branch {
                repo.branch = branch.clone();
            }
            if let Some(location) = &update.location {
                repo.location = location.clone();
            }
            if let Some(auto_sync) = update.auto_sync {
                repo.auto_sync = auto_sync;
            }
            repo.last_update = Utc::now();
            write_repository(tx, &repo)?;
            Ok(repo)
        })
    }

    pub fn delete_repository(&self, url: &str) -> Result<()> {
        self.with_immediate_tx(|tx| {
            let deleted = tx.execute("DELETE FROM repositories WHERE url = ?1", params![url])?;
            if deleted == 0 {
                return Err(Error::not_found(ENTITY, url));
            }
            Ok(())
        })
    }

    pub fn set_auto_sync(&self, url: &str, auto_sync: bool) -> Result<Repository> {
        self.update_repository(
            url,
            &RepositoryUpdate {
                auto_sync: Some(auto_sync),
                ..RepositoryUpdate::default()
            },
        )
    }
}
