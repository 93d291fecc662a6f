mod builder;
mod config;
mod deps;
mod error;

use crate::builder::{normalize_target, BuildSummary, PackageBuilder};
use crate::config::BuilderConfig;
use crate::deps::FetchOutcome;
use anyhow::Result;
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Build an offline update package on a USB volume.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target volume: a drive letter (`E`, `E:`) or a mount point
    target: String,

    /// New version (X.Y.Z); defaults to the current version with the patch
    /// number incremented
    version: Option<String>,

    /// Project to package (overrides POS_PROJECT_ROOT)
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Platform tag written to the manifest (overrides POS_PLATFORM)
    #[arg(long, value_name = "TAG")]
    platform: Option<String>,

    /// Also set the local version marker to the new version
    #[arg(long, conflicts_with = "no_bump_local")]
    bump_local: bool,

    /// Leave the local version marker alone without asking
    #[arg(long)]
    no_bump_local: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = BuilderConfig::from_env();
    if let Some(root) = args.project_root {
        config.project_root = root;
    }
    if let Some(platform) = args.platform {
        config.platform = platform;
    }

    let builder = PackageBuilder::new(config);
    let target = normalize_target(&args.target);

    println!("UPDATE PACKAGE BUILDER");
    println!("{}", "=".repeat(60));
    println!("Project:         {}", builder.config().project_root.display());
    println!("Current version: {}", builder.current_version()?);
    println!("Target:          {}", target.display());
    println!("{}", "=".repeat(60));

    let summary = builder.build(&target, args.version.as_deref())?;

    let bump = if args.bump_local {
        true
    } else if args.no_bump_local {
        false
    } else {
        confirm(&format!("Update the local version marker to {}?", summary.version))?
    };
    if bump {
        builder.bump_local(&summary.version)?;
        println!("Local version marker set to {}", summary.version);
    }

    print_summary(&summary);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(summary: &BuildSummary) {
    let fetch = match &summary.fetch {
        FetchOutcome::NoRequirements => "no requirements file".to_string(),
        FetchOutcome::Fetched { artifacts } => format!("{artifacts} artifacts staged"),
        FetchOutcome::Failed { .. } => "fetch failed, see warnings".to_string(),
        FetchOutcome::TimedOut { after } => format!("fetch timed out after {}s", after.as_secs()),
    };

    println!();
    println!("{}", "=".repeat(60));
    println!("UPDATE PACKAGE CREATED");
    println!("{}", "=".repeat(60));
    println!("Location:     {}", summary.package_dir.display());
    println!("Version:      {} -> {}", summary.previous_version, summary.version);
    println!("Files:        {}", summary.files);
    println!("Dependencies: {} ({})", summary.dependencies.len(), fetch);
    println!("Checksum:     {}...", &summary.checksum[..16.min(summary.checksum.len())]);
    println!();
    println!("Insert the volume into the terminal; the update is offered automatically.");
    println!("{}", "=".repeat(60));
}
