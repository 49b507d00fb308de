//! Script rows keyed by `(command, name)`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};
use crate::script::{CommandLine, LaunchOptions, Script};

use super::Registry;

const ENTITY: &str = "Script";

struct ScriptRow {
    name: String,
    args: String,
    shell: Option<String>,
    cwd: String,
    env: String,
    options: String,
}

impl ScriptRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get("name")?,
            args: row.get("args")?,
            shell: row.get("shell")?,
            cwd: row.get("cwd")?,
            env: row.get("env")?,
            options: row.get("options")?,
        })
    }

    fn into_script(self) -> Result<(String, Script)> {
        let shell: Option<CommandLine> = match self.shell {
            Some(shell) => Some(serde_json::from_str(&shell)?),
            None => None,
        };
        let options: LaunchOptions = serde_json::from_str(&self.options)?;
        let script = Script {
            args: serde_json::from_str(&self.args)?,
            shell,
            cwd: PathBuf::from(self.cwd),
            env: serde_json::from_str(&self.env)?,
            options,
        };
        Ok((self.name, script))
    }
}

fn key(command: &str, name: &str) -> String {
    format!("{}:{}", command, name)
}

pub(super) fn insert_script(conn: &Connection, command: &str, name: &str, script: &Script) -> Result<()> {
    let shell = script
        .shell
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO scripts(command, name, args, shell, cwd, env, options) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            command,
            name,
            serde_json::to_string(&script.args)?,
            shell,
            script.cwd.to_string_lossy(),
            serde_json::to_string(&script.env)?,
            serde_json::to_string(&script.options)?,
        ],
    )?;
    Ok(())
}

pub(super) fn load_scripts(conn: &Connection, command: &str) -> Result<BTreeMap<String, Script>> {
    let mut stmt = conn.prepare(
        "SELECT name, args, shell, cwd, env, options FROM scripts WHERE command = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![command], ScriptRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ScriptRow::into_script).collect()
}

pub(super) fn delete_scripts_of(conn: &Connection, command: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM scripts WHERE command = ?1", params![command])?)
}

fn select_script(conn: &Connection, command: &str, name: &str) -> Result<Option<Script>> {
    let row = conn
        .query_row(
            "SELECT name, args, shell, cwd, env, options FROM scripts \
             WHERE command = ?1 AND name = ?2",
            params![command, name],
            ScriptRow::read,
        )
        .optional()?;
    row.map(|row| row.into_script().map(|(_, script)| script))
        .transpose()
}

impl Registry {
    /// Attach a script to an existing package.
    pub fn add_script(&self, command: &str, name: &str, script: &Script) -> Result<()> {
        self.with_immediate_tx(|tx| {
            if super::packages::select_package(tx, command)?.is_none() {
                return Err(Error::not_found("Package", command));
            }
            if select_script(tx, command, name)?.is_some() {
                return Err(Error::duplicate(ENTITY, key(command, name)));
            }
            insert_script(tx, command, name, script)
        })
    }

    pub fn get_script(&self, command: &str, name: &str) -> Result<Option<Script>> {
        self.read(|conn| select_script(conn, command, name))
    }

    /// Scripts stored for `command`, keyed by name.
    pub fn list_scripts(&self, command: &str) -> Result<BTreeMap<String, Script>> {
        self.read(|conn| load_scripts(conn, command))
    }

    pub fn update_script(&self, command: &str, name: &str, script: &Script) -> Result<()> {
        self.with_immediate_tx(|tx| {
            let deleted = tx.execute(
                "DELETE FROM scripts WHERE command = ?1 AND name = ?2",
                params![command, name],
            )?;
            if deleted == 0 {
                return Err(Error::not_found(ENTITY, key(command, name)));
            }
            insert_script(tx, command, name, script)
        })
    }

    pub fn delete_script(&self, command: &str, name: &str) -> Result<()> {
        self.with_immediate_tx(|tx| {
            let deleted = tx.execute(
                "DELETE FROM scripts WHERE command = ?1 AND name = ?2",
                params![command, name],
            )?;
            if deleted == 0 {
                return Err(Error::not_found(ENTITY, key(command, name)));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::package;
    use crate::script::StdioMode;
    use crate::types::Scope;
    use tempfile::TempDir;

    #[test]
    fn script_crud() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::open(Scope::Workspace, temp.path()).unwrap();
        let mut pkg = package("t1", "g");
        pkg.scripts.clear();
        registry.add_package(&pkg).unwrap();

        let mut script = Script::new(CommandLine::Text("cargo build".into()))
            .with_shell(CommandLine::Tokens(vec!["bash".into(), "-c".into()]))
            .with_cwd("sub")
            .with_env("PROFILE", "release");
        script.options.capture_output = true;
        script.options.stderr = Some(StdioMode::Null);

        registry.add_script("t1", "build", &script).unwrap();
        assert_eq!(registry.get_script("t1", "build").unwrap(), Some(script.clone()));
        assert!(matches!(
            registry.add_script("t1", "build", &script),
            Err(Error::DuplicateKey { .. })
        ));

        let replacement = Script::new(CommandLine::Text("make".into()));
        registry.update_script("t1", "build", &replacement).unwrap();
        assert_eq!(
            registry.list_scripts("t1").unwrap()["build"],
            replacement
        );

        registry.delete_script("t1", "build").unwrap();
        assert!(registry.get_script("t1", "build").unwrap().is_none());
        assert!(matches!(
            registry.delete_script("t1", "build"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            registry.update_script("t1", "build", &replacement),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn scripts_require_a_package() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::open(Scope::User, temp.path()).unwrap();
        let script = Script::new(CommandLine::Text("echo".into()));
        assert!(matches!(
            registry.add_script("ghost", "install", &script),
            Err(Error::NotFound { .. })
        ));
    }
}
