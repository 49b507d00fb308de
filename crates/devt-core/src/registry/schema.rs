//! SQLite schema of a scope registry.

use rusqlite::{Connection, params};

use crate::error::Result;

/// Bumped whenever a table definition changes.
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS packages (
            command TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL,
            dependencies TEXT NOT NULL DEFAULT '{}',
            pkg_group TEXT NOT NULL DEFAULT 'default',
            active INTEGER NOT NULL DEFAULT 1,
            install_date TEXT NOT NULL,
            last_update TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS packages_by_group ON packages(pkg_group);
        CREATE TABLE IF NOT EXISTS scripts (
            command TEXT NOT NULL,
            name TEXT NOT NULL,
            args TEXT NOT NULL,
            shell TEXT,
            cwd TEXT NOT NULL DEFAULT '.',
            env TEXT NOT NULL DEFAULT '{}',
            options TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY(command, name)
        );
        CREATE TABLE IF NOT EXISTS repositories (
            url TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            branch TEXT,
            location TEXT NOT NULL,
            auto_sync INTEGER NOT NULL DEFAULT 0,
            install_date TEXT NOT NULL,
            last_update TEXT NOT NULL
        );
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
