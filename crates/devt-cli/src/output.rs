//! Table and JSON rendering of command results.

use std::fmt::Display;

use anyhow::{Result, bail};
use clap::ValueEnum;
use console::style;

use devt_core::config::EffectiveConfig;
use devt_core::package::{ImportReport, Package};
use devt_core::registry::Repository;
use devt_core::script::ScriptRun;
use devt_core::sync::{BatchSyncReport, RepositorySyncReport};
use devt_core::tools::RebuildReport;
use devt_core::types::Scope;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

pub fn success(message: impl Display) {
    println!("{} {}", style("✓").green(), message);
}

fn failure(message: impl Display) {
    println!("{} {}", style("✗").red(), message);
}

pub fn print_import(report: &ImportReport) {
    for package in &report.packages {
        success(format!(
            "Imported '{}' into group '{}'",
            package.command, package.group
        ));
    }
    for command in &report.skipped {
        println!("• Skipped inactive '{}'", command);
    }
    for item in &report.failures {
        failure(format!("{}: {}", item.source.display(), item.error));
    }
    if report.packages.is_empty() && report.failures.is_empty() && report.skipped.is_empty() {
        println!("No packages found.");
    }
}

pub fn ensure_import_clean(report: Option<&ImportReport>) -> Result<()> {
    match report {
        Some(report) if !report.is_clean() => {
            bail!("{} package(s) failed to import", report.failures.len())
        }
        _ => Ok(()),
    }
}

pub fn print_repository_sync(report: &RepositorySyncReport) {
    let branch = report.branch.as_deref().unwrap_or("detached");
    if report.changed {
        success(format!(
            "{} ({}) updated, {} package(s) imported",
            report.name,
            branch,
            report.imported().len()
        ));
    } else {
        println!("• {} ({}) is up to date", report.name, branch);
    }
    if let Some(import) = &report.import {
        for item in &import.failures {
            failure(format!("{}: {}", item.source.display(), item.error));
        }
    }
}

pub fn print_batch_sync(report: &BatchSyncReport) {
    if report.synced.is_empty() && report.failures.is_empty() {
        println!("No repositories to sync.");
        return;
    }
    for synced in &report.synced {
        print_repository_sync(synced);
    }
    for item in &report.failures {
        failure(format!("{} ({}): {}", item.name, item.url, item.error));
    }
}

pub fn ensure_batch_clean(report: &BatchSyncReport) -> Result<()> {
    if !report.is_clean() {
        bail!("{} repository sync(s) failed", report.failures.len());
    }
    Ok(())
}

/// One line on stderr so foreground output stays clean.
pub fn print_background_summary(report: &BatchSyncReport) {
    if report.synced.is_empty() && report.failures.is_empty() {
        return;
    }
    eprintln!(
        "auto-sync: {} repositories synced, {} failed",
        report.synced.len(),
        report.failures.len()
    );
}

pub fn print_rebuild(report: &RebuildReport) {
    for package in &report.rebuilt {
        success(format!("Rebuilt '{}'", package.command));
    }
    for item in &report.failures {
        failure(format!("{}: {}", item.command, item.error));
    }
    if report.rebuilt.is_empty() && report.failures.is_empty() {
        println!("No packages to rebuild.");
    }
}

pub fn ensure_rebuild_clean(report: &RebuildReport) -> Result<()> {
    if !report.failures.is_empty() {
        bail!("{} package(s) failed to rebuild", report.failures.len());
    }
    Ok(())
}

pub fn print_script_output(run: &ScriptRun) {
    if let Some(stdout) = &run.stdout {
        print!("{stdout}");
    }
    if let Some(stderr) = &run.stderr {
        eprint!("{stderr}");
    }
}

pub fn print_packages(rows: &[(Scope, Package)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No tools installed.");
                println!("Import one with: devt tool import <path>");
                return Ok(());
            }
            println!(
                "{:<20} {:<20} {:<15} {:<10} {:<7} Location",
                "Command", "Name", "Group", "Scope", "Active"
            );
            println!("{}", "-".repeat(90));
            for (scope, package) in rows {
                println!(
                    "{:<20} {:<20} {:<15} {:<10} {:<7} {}",
                    package.command,
                    package.name,
                    package.group,
                    scope,
                    if package.active { "yes" } else { "no" },
                    package.location.display()
                );
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = rows
                .iter()
                .map(|(scope, package)| {
                    serde_json::json!({
                        "scope": scope,
                        "package": package,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_package(scope: Scope, package: &Package, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Command:     {}", package.command);
            println!("Name:        {}", package.name);
            if !package.description.is_empty() {
                println!("Description: {}", package.description);
            }
            println!("Group:       {}", package.group);
            println!("Scope:       {}", scope);
            println!("Active:      {}", package.active);
            println!("Location:    {}", package.location.display());
            println!("Installed:   {}", package.install_date.format("%Y-%m-%d %H:%M:%S"));
            println!("Updated:     {}", package.last_update.format("%Y-%m-%d %H:%M:%S"));
            println!("Scripts:");
            for (name, script) in &package.scripts {
                println!("  {:<12} {}", name, script.args.joined());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "scope": scope,
                "package": package,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_repositories(rows: &[(Scope, Repository)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No repositories configured.");
                println!("Add one with: devt repo add <url>");
                return Ok(());
            }
            println!(
                "{:<20} {:<12} {:<10} {:<5} Url",
                "Name", "Branch", "Scope", "Sync"
            );
            println!("{}", "-".repeat(80));
            for (scope, repo) in rows {
                println!(
                    "{:<20} {:<12} {:<10} {:<5} {}",
                    repo.name,
                    repo.branch.as_deref().unwrap_or("-"),
                    scope,
                    if repo.auto_sync { "on" } else { "off" },
                    repo.url
                );
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = rows
                .iter()
                .map(|(scope, repo)| {
                    serde_json::json!({
                        "scope": scope,
                        "repository": repo,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_repository(scope: Scope, repo: &Repository, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Name:      {}", repo.name);
            println!("Url:       {}", repo.url);
            println!("Branch:    {}", repo.branch.as_deref().unwrap_or("-"));
            println!("Location:  {}", repo.location.display());
            println!("Scope:     {}", scope);
            println!("Auto-sync: {}", repo.auto_sync);
            println!("Installed: {}", repo.install_date.format("%Y-%m-%d %H:%M:%S"));
            println!("Updated:   {}", repo.last_update.format("%Y-%m-%d %H:%M:%S"));
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "scope": scope,
                "repository": repo,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_config(config: &EffectiveConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("scope: {}", config.scope);
            println!("auto_sync: {}", config.auto_sync);
            println!("log_level: {}", config.log_level);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
