//! POS Updater - Main entry point
//!
//! Runs the update daemon by default. The remaining subcommands are
//! one-shot operator tools for terminals without a running host app.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pos_updater::api::{self, AppState};
use pos_updater::config::Config;
use pos_updater::daemon::shutdown::shutdown_signal;
use pos_updater::installer::backup::{list_backups, prune_backups};
use pos_updater::installer::Updater;
use pos_updater::monitor::{UpdateHandler, UsbMonitor};
use pos_updater::package::{load_from_path, UpdateManifest};
use pos_updater::restart::{restart_application, RestartCommand};
use pos_updater::utils;
use pos_updater::volumes::SystemVolumes;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application root (overrides config)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch for update media and serve the local API (default)
    Serve,

    /// Validate an update package and report whether it can be installed
    Inspect {
        /// Volume root or package folder
        path: PathBuf,
    },

    /// Install an update package
    Install {
        /// Volume root or package folder
        path: PathBuf,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Relaunch the application afterwards
        #[arg(long)]
        restart: bool,
    },

    /// Inspect or prune application backups
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
}

#[derive(Subcommand, Debug)]
enum BackupsAction {
    /// List backups, oldest first
    List,

    /// Delete all but the newest backups
    Prune {
        #[arg(long)]
        keep: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("cannot load {}", config_path.display()))?
    } else {
        Config::default()
    };
    if let Some(root) = args.root {
        config.app.root = root;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    config.validate()?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Inspect { path } => inspect(&config, path),
        Command::Install { path, yes, restart } => install(&config, path, yes, restart),
        Command::Backups { action } => backups(&config, action),
    }
}

fn updater_from(config: &Config) -> Result<Updater> {
    let version = config
        .current_version()
        .context("cannot determine the running application version")?;
    Ok(Updater::from_config(config, version))
}

async fn serve(config: Config) -> Result<()> {
    // Initialize start time for uptime tracking
    api::health::init_start_time();

    let updater = updater_from(&config)?;
    tracing::info!(
        "Starting pos-updater v{} (terminal: {}, application {} at {})",
        env!("CARGO_PKG_VERSION"),
        config.app.id,
        updater.current_version(),
        config.app.root.display()
    );

    let cancel = CancellationToken::new();
    let state = AppState::new(config.app.id.clone(), updater)
        .with_restart(RestartCommand::from_config(&config))
        .with_shutdown(cancel.clone());

    // Start USB monitor
    let mut monitor = UsbMonitor::new(SystemVolumes::new())
        .with_check_interval(config.monitor.check_interval())
        .with_stop_timeout(config.monitor.stop_timeout());
    if config.monitor.enabled {
        let pending = state.pending.clone();
        let handler: UpdateHandler = Arc::new(move |manifest: UpdateManifest| -> anyhow::Result<()> {
            pending.offer_blocking(manifest);
            Ok(())
        });
        monitor.start(handler);
    } else {
        tracing::info!("USB monitor disabled");
    }

    // Build router
    let app = api::create_router(state);

    // Start HTTP server
    let ip = config
        .api
        .bind
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid api.bind address {:?}", config.api.bind))?;
    let addr = SocketAddr::new(ip, config.api.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Cleanup
    tracing::info!("Shutting down...");
    monitor.stop().await;
    tracing::info!("Updater stopped");

    Ok(())
}

fn inspect(config: &Config, path: PathBuf) -> Result<()> {
    let manifest = load_from_path(&path)?;
    let updater = updater_from(config)?;
    let (eligible, reason) = updater.can_update(&manifest);

    println!("{}", manifest.to_json_pretty()?);
    println!("Package:  {}", manifest.package_path.display());
    println!("Running:  {}", updater.current_version());
    println!("Eligible: {} ({})", if eligible { "yes" } else { "no" }, reason);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn install(config: &Config, path: PathBuf, yes: bool, restart: bool) -> Result<()> {
    let manifest = load_from_path(&path)?;
    let mut updater = updater_from(config)?;

    let (eligible, reason) = updater.can_update(&manifest);
    if !eligible {
        bail!("cannot install {}: {}", manifest.version, reason);
    }

    println!(
        "Update {} -> {}: {}",
        updater.current_version(),
        manifest.version,
        manifest.description.as_deref().unwrap_or("N/A")
    );
    if !yes && !confirm("Install now?")? {
        println!("Update cancelled");
        return Ok(());
    }

    let report = updater.perform_update(&manifest)?;
    println!("Installed {} ({} files)", report.to_version, report.files_installed);
    println!("Backup:    {}", report.backup.display());
    if let Some(e) = &report.cleanup_error {
        println!("Warning: temporary files were not removed: {e}");
    }

    if restart {
        restart_application(&RestartCommand::from_config(config))?;
    }
    Ok(())
}

fn backups(config: &Config, action: BackupsAction) -> Result<()> {
    match action {
        BackupsAction::List => {
            let entries = list_backups(&config.app.root)?;
            if entries.is_empty() {
                println!("No backups in {}", config.app.root.display());
            }
            for entry in entries {
                let version = entry.version.map(|v| v.to_string()).unwrap_or_else(|| "?".into());
                let created = entry
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".into());
                println!("{:<40} {:<10} {}", entry.name, version, created);
            }
        }
        BackupsAction::Prune { keep } => {
            let removed = prune_backups(&config.app.root, keep)?;
            for path in &removed {
                println!("Removed {}", path.display());
            }
            println!("{} backup(s) removed", removed.len());
        }
    }
    Ok(())
}
