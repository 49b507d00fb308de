//! devt - development tool package manager
//!
//! Usage:
//!   devt repo add <url>           # Clone a tool repository and import its packages
//!   devt tool import <path>       # Import packages from a directory or zip
//!   devt do <tool> <script> ...   # Run a script of an installed tool
//!   devt install <tool>...        # Run the install script of several tools

mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use devt_core::config::DevtConfig;
use devt_core::context::AppContext;
use devt_core::package::PackageBuilder;
use devt_core::registry::{PackageFilter, RepositoryFilter};
use devt_core::transfer;
use devt_core::types::{Scope, ScopeSelector};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "devt")]
#[command(about = "Development tool package manager", version, long_about = None)]
struct Cli {
    /// Registry scope: user, workspace, or both (lookups only)
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Run the background repository sync before the command
    #[arg(long, global = true, overrides_with = "no_auto_sync")]
    auto_sync: bool,

    /// Skip the background repository sync
    #[arg(long, global = true, overrides_with = "auto_sync")]
    no_auto_sync: bool,

    /// Log filter, e.g. `info` or `devt=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print the full error chain on failure
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tool repositories
    Repo(RepoArgs),

    /// Manage installed tool packages
    Tool(ToolArgs),

    /// Run a script of an installed tool
    Do {
        /// Tool command (or display name)
        command: String,
        /// Script name
        script: String,
        /// Extra arguments appended to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a script of the package in the current directory
    Run {
        script: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the `install` script of each tool
    Install { tools: Vec<String> },

    /// Run the `uninstall` script of each tool
    Uninstall { tools: Vec<String> },

    /// Run the `upgrade` script of each tool
    Upgrade { tools: Vec<String> },

    /// Run the `test` script of each tool
    Test { tools: Vec<String> },

    /// Show or change persisted settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct RepoArgs {
    #[command(subcommand)]
    command: RepoSubcommand,
}

#[derive(Subcommand)]
enum RepoSubcommand {
    /// Clone a repository and import its packages
    Add {
        /// Repository URL or path
        url: String,
        /// Branch to check out
        #[arg(long, short)]
        branch: Option<String>,
        /// Display name, also the group of its packages
        #[arg(long)]
        name: Option<String>,
        /// Leave the repository out of auto-sync
        #[arg(long)]
        no_sync: bool,
        /// Re-clone and overwrite existing packages
        #[arg(long, short)]
        force: bool,
    },

    /// Remove a repository and every package it provided
    #[command(alias = "rm")]
    Remove {
        /// Repository name or URL
        repo: String,
    },

    /// Pull one repository (or all) and re-import changed packages
    Sync {
        /// Repository name or URL; every repository when omitted
        repo: Option<String>,
        /// Re-import even when nothing changed
        #[arg(long, short)]
        force: bool,
    },

    /// Sync every auto-sync repository concurrently
    SyncAll {
        #[arg(long, short)]
        force: bool,
    },

    /// List repositories
    List {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Filter by auto-sync flag
        #[arg(long, value_name = "BOOL")]
        sync: Option<bool>,
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one repository
    Info {
        /// Repository name or URL
        repo: String,
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct ToolArgs {
    #[command(subcommand)]
    command: ToolSubcommand,
}

#[derive(Subcommand)]
enum ToolSubcommand {
    /// Import packages from a directory, manifest file or zip archive
    Import {
        path: PathBuf,
        /// Group for the imported packages (defaults to the source name)
        #[arg(long, short)]
        group: Option<String>,
        #[arg(long, short)]
        force: bool,
    },

    /// List installed packages
    List {
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long, value_name = "BOOL")]
        active: Option<bool>,
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one package
    #[command(alias = "show")]
    Info {
        /// Tool command or display name
        command: String,
        #[arg(long, short)]
        group: Option<String>,
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove a package
    #[command(alias = "rm")]
    Remove { command: String },

    /// Remove every package of a group
    RemoveGroup { group: String },

    /// Move a package to the other scope
    Move {
        command: String,
        /// Target scope
        to: String,
        #[arg(long, short)]
        force: bool,
    },

    /// Export a package as a directory or zip archive
    Export {
        command: String,
        output: PathBuf,
        #[arg(long)]
        zip: bool,
        #[arg(long, short)]
        force: bool,
    },

    /// Copy a user package into the workspace so it can be edited there
    Customize {
        command: String,
        #[arg(long, short)]
        force: bool,
    },

    /// Rebuild a package (or a whole group) from its manifest
    Update {
        command: Option<String>,
        #[arg(long, short)]
        group: Option<String>,
    },

    /// Rebuild every active package in place
    Sync,

    /// Include a package in repository re-imports again
    Activate { command: String },

    /// Keep a package out of repository re-imports
    Deactivate { command: String },
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Set KEY=VALUE pairs (scope, auto_sync, log_level)
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
    /// Print the effective settings
    Show {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
    /// Delete the scope's config file
    Reset,
}

impl Commands {
    /// Commands that sync auto-sync repositories before they run.
    ///
    /// Repository and config commands never trigger a background sync.
    fn is_foreground(&self) -> bool {
        matches!(
            self,
            Commands::Do { .. }
                | Commands::Run { .. }
                | Commands::Tool(_)
                | Commands::Install { .. }
                | Commands::Uninstall { .. }
                | Commands::Upgrade { .. }
                | Commands::Test { .. }
        )
    }
}

/// Scope flags resolved against the effective config.
struct Invocation {
    ctx: AppContext,
    scope: Scope,
    selector: ScopeSelector,
    runtime: Runtime,
}

impl Invocation {
    fn tools(&self) -> Result<devt_core::tools::ToolService> {
        Ok(self.ctx.tool_service(self.scope)?)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if debug {
                eprintln!("Error: {err:?}");
            } else {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let selector = match cli.scope.as_deref() {
        Some(raw) => raw.parse::<ScopeSelector>()?,
        None => ScopeSelector::Both,
    };
    let overrides = DevtConfig {
        scope: match selector {
            ScopeSelector::Only(scope) => Some(scope),
            ScopeSelector::Both => None,
        },
        auto_sync: match (cli.auto_sync, cli.no_auto_sync) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        log_level: cli.log_level.clone(),
    };

    let ctx = AppContext::from_env()?;
    let layered = ctx.layered_config(&overrides)?;
    init_tracing(layered.log_level.as_deref());
    let config = layered.resolve();
    debug!(?config, "effective configuration");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    if config.auto_sync && cli.command.is_foreground() {
        if let Some(handle) = start_background_sync(&ctx, config.scope, &runtime) {
            await_background_sync(&runtime, handle);
        }
    }

    let invocation = Invocation {
        ctx,
        scope: config.scope,
        selector,
        runtime,
    };
    dispatch(&invocation, cli.command)
}

/// Wait for the sync so the command sees freshly imported packages.
fn await_background_sync(runtime: &Runtime, handle: BackgroundHandle) {
    match runtime.block_on(handle) {
        Ok(Ok(report)) => output::print_background_summary(&report),
        Ok(Err(e)) => warn!(error = %e, "background sync failed"),
        Err(e) => warn!(error = %e, "background sync task aborted"),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(normalize_level(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(devt_core::config::DEFAULT_LOG_LEVEL)
        }),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Accept `WARNING`/`CRITICAL` style names alongside filter directives.
fn normalize_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

type BackgroundHandle = tokio::task::JoinHandle<devt_core::Result<devt_core::sync::BatchSyncReport>>;

fn start_background_sync(
    ctx: &AppContext,
    scope: Scope,
    runtime: &Runtime,
) -> Option<BackgroundHandle> {
    if which::which("git").is_err() {
        warn!("git is not installed; auto-sync skipped");
        return None;
    }
    let background = match ctx.background_sync(scope) {
        Ok(background) => background,
        Err(e) => {
            warn!(error = %e, "background sync unavailable");
            return None;
        }
    };
    match background.trigger(runtime.handle()) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "background sync not started");
            None
        }
    }
}

fn dispatch(inv: &Invocation, command: Commands) -> Result<()> {
    match command {
        Commands::Repo(args) => run_repo(inv, args.command),
        Commands::Tool(args) => run_tool(inv, args.command),
        Commands::Do {
            command,
            script,
            args,
        } => run_do(inv, &command, &script, &args),
        Commands::Run { script, args } => run_workspace_script(inv, &script, &args),
        Commands::Install { tools } => run_each(inv, &tools, "install"),
        Commands::Uninstall { tools } => run_each(inv, &tools, "uninstall"),
        Commands::Upgrade { tools } => run_each(inv, &tools, "upgrade"),
        Commands::Test { tools } => run_each(inv, &tools, "test"),
        Commands::Config(args) => run_config(inv, args.command),
    }
}

fn run_repo(inv: &Invocation, command: RepoSubcommand) -> Result<()> {
    match command {
        RepoSubcommand::Add {
            url,
            branch,
            name,
            no_sync,
            force,
        } => {
            let sync = inv.ctx.sync_orchestrator(inv.scope)?;
            let report = sync.add_repository(
                &url,
                name.as_deref(),
                branch.as_deref(),
                !no_sync,
                force,
            )?;
            output::print_repository_sync(&report);
            output::ensure_import_clean(report.import.as_ref())
        }
        RepoSubcommand::Remove { repo } => {
            for service in inv.ctx.existing_services(inv.selector)? {
                let sync = devt_core::sync::SyncOrchestrator::new(service);
                match sync.remove_repository(&repo) {
                    Ok(removed) => {
                        output::success(format!(
                            "Removed repository '{}' ({} scope)",
                            removed.name,
                            sync.registry().scope()
                        ));
                        return Ok(());
                    }
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            bail!("Repository '{}' not found in any scope", repo)
        }
        RepoSubcommand::Sync { repo, force } => {
            let sync = inv.ctx.sync_orchestrator(inv.scope)?;
            let report = match repo {
                Some(repo) => {
                    let found = sync.find_repository(&repo)?;
                    let synced = sync.sync_repository(&found, force)?;
                    devt_core::sync::BatchSyncReport {
                        synced: vec![synced],
                        failures: Vec::new(),
                    }
                }
                None => sync.sync_repositories(&RepositoryFilter::new(), force)?,
            };
            output::print_batch_sync(&report);
            output::ensure_batch_clean(&report)
        }
        RepoSubcommand::SyncAll { force } => {
            let sync = inv.ctx.sync_orchestrator(inv.scope)?;
            let report = inv.runtime.block_on(sync.sync_all_auto_sync(force))?;
            output::print_batch_sync(&report);
            output::ensure_batch_clean(&report)
        }
        RepoSubcommand::List {
            url,
            name,
            branch,
            location,
            sync,
            format,
        } => {
            let filter = RepositoryFilter {
                url,
                name,
                branch,
                location,
                auto_sync: sync,
            };
            let mut rows = Vec::new();
            for service in inv.ctx.existing_services(inv.selector)? {
                let scope = service.scope();
                for repo in service.registry().list_repositories(&filter)? {
                    rows.push((scope, repo));
                }
            }
            output::print_repositories(&rows, format)
        }
        RepoSubcommand::Info { repo, format } => {
            for service in inv.ctx.existing_services(inv.selector)? {
                let scope = service.scope();
                let sync = devt_core::sync::SyncOrchestrator::new(service);
                match sync.find_repository(&repo) {
                    Ok(found) => return output::print_repository(scope, &found, format),
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            bail!("Repository '{}' not found in any scope", repo)
        }
    }
}

fn run_tool(inv: &Invocation, command: ToolSubcommand) -> Result<()> {
    match command {
        ToolSubcommand::Import { path, group, force } => {
            let report = inv.tools()?.import(&path, group.as_deref(), force)?;
            output::print_import(&report);
            output::ensure_import_clean(Some(&report))
        }
        ToolSubcommand::List {
            command,
            name,
            description,
            location,
            group,
            active,
            format,
        } => {
            let filter = PackageFilter {
                command,
                name,
                description,
                location,
                group,
                active,
            };
            let mut rows = Vec::new();
            for service in inv.ctx.existing_services(inv.selector)? {
                let scope = service.scope();
                for package in service.list(&filter)? {
                    rows.push((scope, package));
                }
            }
            output::print_packages(&rows, format)
        }
        ToolSubcommand::Info {
            command,
            group,
            format,
        } => {
            for service in inv.ctx.existing_services(inv.selector)? {
                match service.find(&command, group.as_deref()) {
                    Ok(package) => return output::print_package(service.scope(), &package, format),
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            bail!("Tool '{}' not found in any scope", command)
        }
        ToolSubcommand::Remove { command } => {
            let removed = inv.tools()?.remove(&command)?;
            output::success(format!("Removed tool '{}'", removed.command));
            Ok(())
        }
        ToolSubcommand::RemoveGroup { group } => {
            let removed = inv.tools()?.remove_group(&group)?;
            output::success(format!(
                "Removed {} tool(s) from group '{}'",
                removed.len(),
                group
            ));
            Ok(())
        }
        ToolSubcommand::Move { command, to, force } => {
            let target: Scope = to.parse()?;
            let source_service = inv.ctx.tool_service(target.other())?;
            let target_service = inv.ctx.tool_service(target)?;
            let moved = transfer::move_package(&source_service, &target_service, &command, force)?;
            output::success(format!(
                "Moved tool '{}' to {} scope",
                moved.command, target
            ));
            Ok(())
        }
        ToolSubcommand::Export {
            command,
            output: destination,
            zip,
            force,
        } => {
            let written = inv.tools()?.export(&command, &destination, zip, force)?;
            output::success(format!("Exported '{}' to {}", command, written.display()));
            Ok(())
        }
        ToolSubcommand::Customize { command, force } => {
            let user = inv.ctx.tool_service(Scope::User)?;
            let workspace = inv.ctx.tool_service(Scope::Workspace)?;
            let copied = transfer::copy_package(&user, &workspace, &command, force)?;
            output::success(format!(
                "Copied '{}' into the workspace at {}",
                copied.command,
                copied.location.display()
            ));
            Ok(())
        }
        ToolSubcommand::Update { command, group } => {
            let tools = inv.tools()?;
            match (command, group) {
                (Some(command), _) => {
                    let updated = tools.update(&command)?;
                    output::success(format!("Updated tool '{}'", updated.command));
                    Ok(())
                }
                (None, Some(group)) => {
                    let report = tools.update_group(&group)?;
                    output::print_rebuild(&report);
                    output::ensure_rebuild_clean(&report)
                }
                (None, None) => bail!("Give a tool command or --group"),
            }
        }
        ToolSubcommand::Sync => {
            let report = inv.tools()?.sync_active()?;
            output::print_rebuild(&report);
            output::ensure_rebuild_clean(&report)
        }
        ToolSubcommand::Activate { command } => {
            inv.tools()?.set_active(&command, true)?;
            output::success(format!("Activated '{}'", command));
            Ok(())
        }
        ToolSubcommand::Deactivate { command } => {
            inv.tools()?.set_active(&command, false)?;
            output::success(format!("Deactivated '{}'", command));
            Ok(())
        }
    }
}

fn run_do(inv: &Invocation, command: &str, script: &str, args: &[String]) -> Result<()> {
    let (service, package) = inv.ctx.find_package(command, inv.selector)?;
    let run = service.run(&package.command, script, args)?;
    output::print_script_output(&run);
    Ok(())
}

fn run_workspace_script(inv: &Invocation, script: &str, args: &[String]) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let package = PackageBuilder::new(&cwd)?
        .with_platform(inv.ctx.platform())
        .build()?;
    let run = package.run_script(script, args, inv.ctx.platform())?;
    output::print_script_output(&run);
    Ok(())
}

fn run_each(inv: &Invocation, tools: &[String], script: &str) -> Result<()> {
    if tools.is_empty() {
        bail!("Give at least one tool command");
    }
    for tool in tools {
        run_do(inv, tool, script, &[]).with_context(|| format!("{script} failed for '{tool}'"))?;
    }
    Ok(())
}

fn run_config(inv: &Invocation, command: ConfigSubcommand) -> Result<()> {
    let store = inv.ctx.config_store(inv.scope);
    match command {
        ConfigSubcommand::Set { options } => {
            let mut config = store.load()?;
            for option in &options {
                config.set(option)?;
            }
            store.save(&config)?;
            output::success(format!("Updated {}", store.config_path().display()));
            Ok(())
        }
        ConfigSubcommand::Show { format } => {
            let effective = inv.ctx.effective_config(&DevtConfig::new())?;
            output::print_config(&effective, format)
        }
        ConfigSubcommand::Reset => {
            store.reset()?;
            output::success(format!("Reset {} configuration", inv.scope));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn do_keeps_hyphenated_script_args() {
        let cli = Cli::try_parse_from(["devt", "do", "fmt", "check", "--all", "-v"]).unwrap();
        match cli.command {
            Commands::Do { command, script, args } => {
                assert_eq!(command, "fmt");
                assert_eq!(script, "check");
                assert_eq!(args, vec!["--all", "-v"]);
            }
            _ => panic!("expected do"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["devt", "tool", "list", "--scope", "user", "--no-auto-sync"])
            .unwrap();
        assert_eq!(cli.scope.as_deref(), Some("user"));
        assert!(cli.no_auto_sync);
        assert!(cli.command.is_foreground());
    }

    #[test]
    fn only_tool_commands_wait_for_a_sync() {
        for args in [
            &["devt", "install", "t1"][..],
            &["devt", "do", "t1", "test"],
            &["devt", "run", "build"],
            &["devt", "tool", "list"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(cli.command.is_foreground(), "{args:?}");
        }
        for args in [
            &["devt", "repo", "list"][..],
            &["devt", "config", "show"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(!cli.command.is_foreground(), "{args:?}");
        }
    }

    #[test]
    fn legacy_level_names() {
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("devt=debug"), "devt=debug");
    }
}
