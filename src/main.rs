// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use drivesoft::catalog::{self, CatalogFilter, CatalogStore, PackageFormat, PublishRequest, Software};
use drivesoft::config::{self, Config};
use drivesoft::download::{
    DownloadError, DownloadManager, DownloadSession, FaultPlan, RandomDrop, Sequencer, SessionStatus,
};
use drivesoft::error::describe;
use drivesoft::filesave::DiskFileSaver;
use drivesoft::gateway;
use drivesoft::store::{InstalledStore, JsonInstalledStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Data error - invalid input data format
    pub const DATA_ERR: i32 = 65;
    /// Temporary failure - try again later
    pub const TEMP_FAIL: i32 = 75;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// DriveSoft download engine.
#[derive(Parser)]
#[command(name = "drivesoft")]
#[command(version = VERSION)]
#[command(about = "Browse the DriveSoft catalog and run download sessions.")]
#[command(long_about = "DriveSoft download engine\n\n\
    Browse packages:     drivesoft catalog --format exe\n\
    Download:            drivesoft download 1 2\n\
    Installed packages:  drivesoft installed\n\
    Run an installer:    drivesoft run 1")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Quiet mode: only errors are logged
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: log every session step
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog packages
    ///
    /// Examples:
    ///   drivesoft catalog
    ///   drivesoft catalog --search studio --format exe
    #[command(alias = "ls")]
    Catalog {
        /// Match against name and description (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,
        /// Only show one format (exe, zip, iso)
        #[arg(short, long)]
        format: Option<PackageFormat>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one package in detail
    Show {
        id: String,
    },

    /// Download one or more packages
    ///
    /// Examples:
    ///   drivesoft download 1
    ///   drivesoft download 1 2 --no-save
    ///   drivesoft download 1 --fail-at downloading:40
    #[command(alias = "dl")]
    Download {
        /// Package ids
        #[arg(required = true)]
        ids: Vec<String>,
        /// Do not write a placeholder file on completion
        #[arg(long)]
        no_save: bool,
        /// Inject a failure at STATUS or STATUS:PROGRESS
        #[arg(long, value_name = "STATUS[:PROGRESS]")]
        fail_at: Option<FaultPlan>,
        /// Probability (0-1) that each downloading step drops the connection
        #[arg(long, value_name = "P", conflicts_with = "fail_at")]
        drop_rate: Option<f64>,
        /// Print every snapshot as a JSON line instead of progress bars
        #[arg(long)]
        json: bool,
    },

    /// List installed packages
    Installed {
        #[arg(long)]
        json: bool,
    },

    /// Publish a binary to the catalog
    ///
    /// Examples:
    ///   drivesoft publish ./studio.exe --name "Studio" --version 2.0.0
    #[command(disable_version_flag = true)]
    Publish {
        /// Binary to publish (.exe, .zip or .iso)
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// Version of the published package
        #[arg(long = "version", id = "package_version", value_name = "VERSION")]
        version: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        update_url: Option<String>,
        #[arg(long)]
        icon_url: Option<String>,
    },

    /// Check whether a newer version is published
    CheckUpdate {
        id: String,
        /// Version currently installed
        #[arg(id = "current_version", value_name = "VERSION")]
        version: String,
    },

    /// Run an installed executable package
    Run {
        id: String,
    },

    /// Show gateway status and API manifest
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommand>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Set the folder placeholder files are saved to
    SetDownloadDir { dir: PathBuf },
    /// Set the folder holding catalog.json and installed.json
    SetDataDir { dir: PathBuf },
    /// Enable or disable placeholder files
    SetSavePlaceholders {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", describe(&e).fix("Fix or delete config.json").build().red());
            std::process::exit(CONFIG);
        }
    };

    init_logging(cli.verbose, cli.quiet, &config.log_level);

    let code = match run(cli.command, config).await {
        Ok(()) => SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("{}", describe(&e).build().red());
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool, quiet: bool, configured: &str) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::ERROR
    } else {
        configured.parse().unwrap_or(tracing::Level::WARN)
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<catalog::CatalogError>().is_some()
        || err.downcast_ref::<catalog::LaunchError>().is_some()
    {
        DATA_ERR
    } else if err.downcast_ref::<DownloadError>().is_some() {
        TEMP_FAIL
    } else {
        ERROR
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let data_dir = config.data_dir()?;
    let registry = CatalogStore::in_dir(&data_dir);
    let installed = Arc::new(JsonInstalledStore::in_dir(&data_dir));

    match command {
        Commands::Catalog { search, format, json } => {
            let filter = CatalogFilter { term: search.unwrap_or_default(), format };
            let apps = registry.search(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            } else {
                print_catalog(&apps, installed.as_ref())?;
            }
        }

        Commands::Show { id } => {
            let app = registry.get(&id)?;
            print_details(&app, installed.contains(&app.id)?);
        }

        Commands::Download { ids, no_save, fail_at, drop_rate, json } => {
            let items = ids
                .iter()
                .map(|id| registry.get(id))
                .collect::<Result<Vec<_>>>()?;

            let mut sequencer = Sequencer::new(installed.clone());
            if config.save_placeholders && !no_save {
                sequencer = sequencer.with_file_saver(Arc::new(DiskFileSaver::new(config.download_dir()?)));
            }
            if let Some(plan) = fail_at {
                sequencer = sequencer.with_faults(Arc::new(plan));
            } else if let Some(p) = drop_rate {
                sequencer = sequencer.with_faults(Arc::new(RandomDrop::new(p)));
            }

            if json {
                download_json(&sequencer, &items).await?;
            } else {
                download_with_progress(sequencer, &items).await?;
            }
        }

        Commands::Installed { json } => {
            let ids = installed.installed()?;
            let apps = registry.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("Nothing installed yet. Try: drivesoft download <id>");
            } else {
                for id in ids {
                    match apps.iter().find(|a| a.id == id) {
                        Some(app) => println!("{} {:>14}  {} v{}", "✓".green(), app.id, app.name.bold(), app.version),
                        None => println!("{} {:>14}  {}", "?".yellow(), id, "(no longer in catalog)".dimmed()),
                    }
                }
            }
        }

        Commands::Publish { file, name, version, description, update_url, icon_url } => {
            let request = PublishRequest {
                name,
                version,
                description,
                update_url,
                icon_url,
                author: config.publisher.clone(),
            };
            let app = registry.publish(request, &file)?;
            println!("{} Published {} v{} as id {}", "[OK]".green(), app.name.bold(), app.version, app.id);
            println!("     Update code: {}", app.update_code);
        }

        Commands::CheckUpdate { id, version } => {
            let app = registry.get(&id)?;
            let check = registry.check_update(&id, &version)?;
            match check.new_version {
                Some(new_version) if check.update_available => {
                    println!("{} Update available for {}: v{} -> v{}", "[!]".yellow(), app.name, version, new_version);
                    println!("     Get it with: drivesoft download {}", id);
                }
                _ => println!("{} {} is up to date (v{})", "[OK]".green(), app.name, version),
            }
        }

        Commands::Run { id } => {
            let app = registry.get(&id)?;
            let report = catalog::launch(&app, installed.contains(&app.id)?)?;
            println!("{}", format!("▶ {}", report.name).bold());
            println!("  Started in {}", report.runtime.cyan());
            if !report.description.is_empty() {
                println!("  {}", report.description);
            }
            println!("  {}", format!("Binary version: {} | Hash: {}", report.version, report.update_code).dimmed());
        }

        Commands::Status { json } => {
            let status = gateway::system_status();
            let manifest = gateway::api_manifest();
            if json {
                let doc = serde_json::json!({ "status": status, "manifest": manifest });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("{} {} ({}, uptime {})", manifest.name.bold(), status.status.green(), status.version, status.uptime);
                println!("Nodes: {}", status.nodes.join(", "));
                for endpoint in &manifest.endpoints {
                    println!("  {:<6} {:<16} {}", endpoint.method, endpoint.path, endpoint.description.dimmed());
                }
            }
        }

        Commands::Config { action } => {
            let home = config::home_dir()?;
            match action.unwrap_or(ConfigCommand::Show) {
                ConfigCommand::Show => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                    println!("data dir:     {}", data_dir.display());
                    println!("download dir: {}", config.download_dir()?.display());
                }
                ConfigCommand::Path => println!("{}", home.join(config::CONFIG_FILE).display()),
                ConfigCommand::SetDownloadDir { dir } => {
                    let updated = Config { download_dir: Some(dir), ..config };
                    let path = updated.save_to(&home)?;
                    println!("{} Saved {}", "[OK]".green(), path.display());
                }
                ConfigCommand::SetDataDir { dir } => {
                    let updated = Config { data_dir: Some(dir), ..config };
                    let path = updated.save_to(&home)?;
                    println!("{} Saved {}", "[OK]".green(), path.display());
                }
                ConfigCommand::SetSavePlaceholders { enabled } => {
                    let updated = Config { save_placeholders: enabled, ..config };
                    let path = updated.save_to(&home)?;
                    println!("{} Saved {}", "[OK]".green(), path.display());
                }
            }
        }
    }

    Ok(())
}

fn print_catalog(apps: &[Software], installed: &dyn InstalledStore) -> Result<()> {
    if apps.is_empty() {
        println!("No packages match. Try: drivesoft catalog");
        return Ok(());
    }
    let installed_ids = installed.installed()?;
    for app in apps {
        let mark = if installed_ids.contains(&app.id) { "✓".green() } else { " ".normal() };
        let format = match app.format {
            PackageFormat::Exe => app.format.to_string().blue(),
            PackageFormat::Zip => app.format.to_string().yellow(),
            PackageFormat::Iso => app.format.to_string().magenta(),
        };
        println!("{} {:>14}  {:<4} {} v{}", mark, app.id, format, app.name.bold(), app.version);
    }
    println!("{}", format!("Found: {} packages", apps.len()).dimmed());
    Ok(())
}

fn print_details(app: &Software, installed: bool) {
    println!("{} v{}", app.name.bold(), app.version);
    if !app.description.is_empty() {
        println!("  {}", app.description);
    }
    println!("  id:        {}", app.id);
    println!("  format:    {} ({})", app.format, app.format.mime_type());
    println!("  author:    {}", app.author);
    println!("  released:  {}", app.release_date);
    println!("  source:    {}", app.download_url);
    println!("  hash:      {}", app.update_code);
    println!("  installed: {}", if installed { "yes".green() } else { "no".normal() });
}

/// One JSON line per snapshot; sessions run concurrently.
async fn download_json(sequencer: &Sequencer, items: &[Software]) -> Result<()> {
    let runs = items.iter().map(|item| {
        sequencer.run(item, |snapshot| {
            if let Ok(line) = serde_json::to_string(snapshot) {
                println!("{}", line);
            }
        })
    });
    let outcomes = futures_util::future::join_all(runs).await;
    outcomes
        .into_iter()
        .find_map(|outcome| outcome.err())
        .map_or(Ok(()), |e| Err(e.into()))
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {prefix:<24.bold} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn render(bar: &ProgressBar, snapshot: &DownloadSession) {
    bar.set_position(u64::from(snapshot.progress));
    match snapshot.status {
        SessionStatus::Completed => bar.finish_with_message("completed".green().to_string()),
        SessionStatus::Failed => {
            let reason = snapshot.error.as_deref().unwrap_or("unknown error");
            bar.abandon_with_message(format!("failed: {}", reason).red().to_string());
        }
        status => bar.set_message(status.to_string()),
    }
}

/// Progress bars, one per session, driven by the manager's watch channels.
///
/// Returns how many sessions completed.
async fn download_with_progress(sequencer: Sequencer, items: &[Software]) -> Result<usize> {
    let manager = DownloadManager::new(sequencer);
    let multi = MultiProgress::new();
    let mut handles = Vec::with_capacity(items.len());
    let mut renderers = Vec::with_capacity(items.len());

    for item in items {
        let handle = manager.start(item)?;
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(progress_style());
        bar.set_prefix(item.name.clone());

        let mut rx = handle.subscribe();
        renderers.push(tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                render(&bar, &snapshot);
                if snapshot.status.is_terminal() || rx.changed().await.is_err() {
                    break;
                }
            }
        }));
        handles.push(handle);
    }

    let mut completed = 0;
    let mut first_error = None;
    for handle in handles {
        let id = handle.id.clone();
        match handle.wait().await {
            Ok(_) => {
                completed += 1;
                tracing::debug!(id = %id, "Session finished");
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    for renderer in renderers {
        renderer.await.context("Progress renderer stopped unexpectedly")?;
    }

    println!("{} {}/{} downloads completed", "[OK]".green(), completed, items.len());

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["drivesoft"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_set_save_placeholders_takes_a_value() {
        match parse(&["config", "set-save-placeholders", "false"]) {
            Commands::Config { action: Some(ConfigCommand::SetSavePlaceholders { enabled }) } => assert!(!enabled),
            _ => panic!("Expected config set-save-placeholders"),
        }
        match parse(&["config", "set-save-placeholders", "true"]) {
            Commands::Config { action: Some(ConfigCommand::SetSavePlaceholders { enabled }) } => assert!(enabled),
            _ => panic!("Expected config set-save-placeholders"),
        }
    }

    #[test]
    fn test_publish_version_flag() {
        match parse(&["publish", "f.exe", "--version", "2.0.0", "--name", "Studio"]) {
            Commands::Publish { file, version, name, .. } => {
                assert_eq!(file, PathBuf::from("f.exe"));
                assert_eq!(version.as_deref(), Some("2.0.0"));
                assert_eq!(name.as_deref(), Some("Studio"));
            }
            _ => panic!("Expected publish"),
        }
    }

    #[test]
    fn test_check_update_positional_version() {
        match parse(&["check-update", "1", "1.0.0"]) {
            Commands::CheckUpdate { id, version } => {
                assert_eq!(id, "1");
                assert_eq!(version, "1.0.0");
            }
            _ => panic!("Expected check-update"),
        }
    }

    #[test]
    fn test_download_with_fault_plan() {
        match parse(&["download", "1", "--fail-at", "downloading:40"]) {
            Commands::Download { ids, fail_at, drop_rate, no_save, json } => {
                assert_eq!(ids, vec!["1".to_string()]);
                assert_eq!(fail_at, Some(FaultPlan::at(SessionStatus::Downloading, Some(40))));
                assert!(drop_rate.is_none() && !no_save && !json);
            }
            _ => panic!("Expected download"),
        }
    }

    #[test]
    fn test_download_rejects_conflicting_faults() {
        let result = Cli::try_parse_from(["drivesoft", "download", "1", "--fail-at", "verifying", "--drop-rate", "0.5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_remaining_commands_parse() {
        assert!(matches!(parse(&["ls", "--format", "exe"]), Commands::Catalog { format: Some(PackageFormat::Exe), .. }));
        assert!(matches!(parse(&["show", "2"]), Commands::Show { .. }));
        assert!(matches!(parse(&["installed", "--json"]), Commands::Installed { json: true }));
        assert!(matches!(parse(&["run", "1"]), Commands::Run { .. }));
        assert!(matches!(parse(&["status"]), Commands::Status { json: false }));
        assert!(matches!(parse(&["config"]), Commands::Config { action: None }));
    }

    #[tokio::test]
    async fn test_duplicate_ids_count_every_session() {
        let installed = Arc::new(drivesoft::store::MemoryInstalledStore::new());
        let sequencer = Sequencer::new(installed).with_clock(Arc::new(drivesoft::download::VirtualClock::new()));
        let item = Software::new("2", "DLS Gateway Core", PackageFormat::Zip);

        let completed = download_with_progress(sequencer, &[item.clone(), item]).await.unwrap();
        assert_eq!(completed, 2);
    }
}
