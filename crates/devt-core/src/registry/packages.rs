//! Package rows and the composite register/unregister operations.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::info;

use crate::error::{Error, Result};
use crate::manifest::Node;
use crate::package::Package;

use super::Registry;
use super::scripts::{delete_scripts_of, insert_script, load_scripts};

const ENTITY: &str = "Package";

const COLUMNS: &str = "command, name, description, location, dependencies, pkg_group, active, \
                       install_date, last_update";

/// Filter for [`Registry::list_packages`]. Set fields are AND-ed.
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    /// Exact command.
    pub command: Option<String>,
    /// Substring of the display name.
    pub name: Option<String>,
    /// Substring of the description.
    pub description: Option<String>,
    /// Substring of the install location.
    pub location: Option<String>,
    /// Exact group.
    pub group: Option<String>,
    pub active: Option<bool>,
}

impl PackageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(command) = &self.command {
            clauses.push("command = ?");
            values.push(Value::Text(command.clone()));
        }
        for (clause, needle) in [
            ("instr(name, ?) > 0", &self.name),
            ("instr(description, ?) > 0", &self.description),
            ("instr(location, ?) > 0", &self.location),
        ] {
            if let Some(needle) = needle {
                clauses.push(clause);
                values.push(Value::Text(needle.clone()));
            }
        }
        if let Some(group) = &self.group {
            clauses.push("pkg_group = ?");
            values.push(Value::Text(group.clone()));
        }
        if let Some(active) = self.active {
            clauses.push("active = ?");
            values.push(Value::Integer(i64::from(active)));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Partial update for [`Registry::update_package`].
#[derive(Debug, Clone, Default)]
pub struct PackageUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<PathBuf>,
    pub dependencies: Option<Node>,
    pub group: Option<String>,
    pub active: Option<bool>,
}

struct PackageRow {
    command: String,
    name: String,
    description: String,
    location: String,
    dependencies: String,
    group: String,
    active: bool,
    install_date: DateTime<Utc>,
    last_update: DateTime<Utc>,
}

impl PackageRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            command: row.get("command")?,
            name: row.get("name")?,
            description: row.get("description")?,
            location: row.get("location")?,
            dependencies: row.get("dependencies")?,
            group: row.get("pkg_group")?,
            active: row.get("active")?,
            install_date: row.get("install_date")?,
            last_update: row.get("last_update")?,
        })
    }

    fn into_package(self, conn: &Connection) -> Result<Package> {
        let scripts = load_scripts(conn, &self.command)?;
        Ok(Package {
            dependencies: serde_json::from_str(&self.dependencies)?,
            command: self.command,
            name: self.name,
            description: self.description,
            location: PathBuf::from(self.location),
            group: self.group,
            active: self.active,
            install_date: self.install_date,
            last_update: self.last_update,
            scripts,
        })
    }
}

pub(super) fn select_package(conn: &Connection, command: &str) -> Result<Option<Package>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM packages WHERE command = ?1"),
            params![command],
            PackageRow::read,
        )
        .optional()?;
    row.map(|row| row.into_package(conn)).transpose()
}

fn insert_package_row(conn: &Connection, package: &Package) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO packages({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            package.command,
            package.name,
            package.description,
            package.location.to_string_lossy(),
            serde_json::to_string(&package.dependencies)?,
            package.group,
            package.active,
            package.install_date,
            package.last_update,
        ],
    )?;
    Ok(())
}

fn write_package_row(conn: &Connection, package: &Package) -> Result<()> {
    conn.execute(
        "UPDATE packages SET name = ?2, description = ?3, location = ?4, dependencies = ?5, \
         pkg_group = ?6, active = ?7, install_date = ?8, last_update = ?9 WHERE command = ?1",
        params![
            package.command,
            package.name,
            package.description,
            package.location.to_string_lossy(),
            serde_json::to_string(&package.dependencies)?,
            package.group,
            package.active,
            package.install_date,
            package.last_update,
        ],
    )?;
    Ok(())
}

fn existing_group(conn: &Connection, command: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT pkg_group FROM packages WHERE command = ?1",
            params![command],
            |row| row.get(0),
        )
        .optional()?)
}

impl Registry {
    /// Insert a package row. Scripts are stored separately.
    pub fn add_package(&self, package: &Package) -> Result<()> {
        self.with_immediate_tx(|tx| {
            if existing_group(tx, &package.command)?.is_some() {
                return Err(Error::duplicate(ENTITY, &package.command));
            }
            insert_package_row(tx, package)
        })
    }

    pub fn get_package(&self, command: &str) -> Result<Option<Package>> {
        self.read(|conn| select_package(conn, command))
    }

    /// Packages matching `filter`, ordered by group then command.
    pub fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        self.read(|conn| {
            let (clause, values) = filter.where_clause();
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM packages{clause} ORDER BY pkg_group, command"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), PackageRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(|row| row.into_package(conn)).collect()
        })
    }

    /// Apply a partial update; `last_update` is refreshed, `install_date` kept.
    pub fn update_package(&self, command: &str, update: &PackageUpdate) -> Result<Package> {
        self.with_immediate_tx(|tx| {
            let mut package =
                select_package(tx, command)?.ok_or_else(|| Error::not_found(ENTITY, command))?;
            if let Some(name) = &update.name {
                package.name = name.clone();
            }
            if let Some(description) = &update.description {
                package.description = description.clone();
            }
            if let Some(location) = &update.location {
                package.location = location.clone();
            }
            if let Some(dependencies) = &update.dependencies {
                package.dependencies = dependencies.clone();
            }
            if let Some(group) = &update.group {
                package.group = group.clone();
            }
            if let Some(active) = update.active {
                package.active = active;
            }
            package.last_update = Utc::now();
            write_package_row(tx, &package)?;
            Ok(package)
        })
    }

    /// Delete the package row only; its scripts stay until removed explicitly.
    pub fn delete_package(&self, command: &str) -> Result<()> {
        self.with_immediate_tx(|tx| {
            let deleted = tx.execute("DELETE FROM packages WHERE command = ?1", params![command])?;
            if deleted == 0 {
                return Err(Error::not_found(ENTITY, command));
            }
            Ok(())
        })
    }

    pub fn activate_package(&self, command: &str) -> Result<Package> {
        self.set_active(command, true)
    }

    pub fn deactivate_package(&self, command: &str) -> Result<Package> {
        self.set_active(command, false)
    }

    fn set_active(&self, command: &str, active: bool) -> Result<Package> {
        self.update_package(
            command,
            &PackageUpdate {
                active: Some(active),
                ..PackageUpdate::default()
            },
        )
    }

    /// Look a package up by command, falling back to an exact name match.
    ///
    /// With no `group`, a name shared by packages of several groups is
    /// reported as [`Error::AmbiguousPackage`].
    pub fn find_package(&self, name_or_command: &str, group: Option<&str>) -> Result<Option<Package>> {
        if let Some(package) = self.get_package(name_or_command)? {
            if group.is_none_or(|group| package.group == group) {
                return Ok(Some(package));
            }
        }

        let mut filter = PackageFilter::new().with_name(name_or_command);
        if let Some(group) = group {
            filter = filter.with_group(group);
        }
        let mut matches: Vec<Package> = self
            .list_packages(&filter)?
            .into_iter()
            .filter(|package| package.name == name_or_command)
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                let mut groups: Vec<String> = matches.into_iter().map(|p| p.group).collect();
                groups.dedup();
                Err(Error::AmbiguousPackage {
                    name: name_or_command.to_string(),
                    groups,
                })
            }
        }
    }

    /// Store a package and all of its scripts in one transaction.
    ///
    /// An existing entry of the same group is replaced when `force` is set,
    /// keeping its `install_date`. A command registered under another group
    /// is always a [`Error::DuplicateKey`].
    pub fn register_package(&self, package: &Package, force: bool) -> Result<Package> {
        self.with_immediate_tx(|tx| {
            let mut stored = package.clone();
            if let Some(existing) = select_package(tx, &package.command)? {
                if existing.group != package.group {
                    return Err(Error::duplicate(
                        ENTITY,
                        format!("{} (registered in group '{}')", package.command, existing.group),
                    ));
                }
                if !force {
                    return Err(Error::duplicate(ENTITY, &package.command));
                }
                stored.install_date = existing.install_date;
                tx.execute(
                    "DELETE FROM packages WHERE command = ?1",
                    params![package.command],
                )?;
            }
            // Scripts left behind by a plain `delete_package` are orphans.
            delete_scripts_of(tx, &package.command)?;
            insert_package_row(tx, &stored)?;
            for (name, script) in &stored.scripts {
                insert_script(tx, &stored.command, name, script)?;
            }
            info!(command = %stored.command, group = %stored.group, "registered package");
            Ok(stored)
        })
    }

    /// Replace a registered package with a rebuilt one.
    ///
    /// `install_date` and `active` of the stored entry survive; every script
    /// row is rewritten.
    pub fn replace_package(&self, package: &Package) -> Result<Package> {
        self.with_immediate_tx(|tx| {
            let existing = select_package(tx, &package.command)?
                .ok_or_else(|| Error::not_found(ENTITY, &package.command))?;
            let mut stored = package.clone();
            stored.install_date = existing.install_date;
            stored.active = existing.active;
            stored.last_update = Utc::now();
            write_package_row(tx, &stored)?;
            delete_scripts_of(tx, &stored.command)?;
            for (name, script) in &stored.scripts {
                insert_script(tx, &stored.command, name, script)?;
            }
            Ok(stored)
        })
    }

    /// Remove a package and its scripts in one transaction.
    pub fn unregister_package(&self, command: &str) -> Result<Package> {
        self.with_immediate_tx(|tx| {
            let package =
                select_package(tx, command)?.ok_or_else(|| Error::not_found(ENTITY, command))?;
            delete_scripts_of(tx, command)?;
            tx.execute("DELETE FROM packages WHERE command = ?1", params![command])?;
            info!(%command, "unregistered package");
            Ok(package)
        })
    }
}
