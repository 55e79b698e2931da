#![deny(unsafe_code)]

mod auth;
mod commands;
mod config;
mod exit_code;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netmount_core::{CryptoError, ValidationError};
use netmount_mount::{Error as ManagerError, LockError};

use crate::commands::{ConnectionFailed, OutputMode, PartialFailure, discover, mounts, shares};
use crate::config::Config;

/// Manage SMB and NFS remote shares mounted on this host
#[derive(Parser)]
#[command(name = "netmount")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Register a guest SMB share and mount it right away
    netmount create --name media --type smb --server 192.168.1.5 --share movies --auto-mount

    # Register an NFS export
    netmount create --name backup --type nfs --server nas.local --share /export/backup

    # See what a server offers
    netmount discover shares 192.168.1.5 --username alice --ask-password

    # Unmount everything before shutdown
    netmount unmount --all
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: <config dir>/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Secret used to encrypt stored share passwords
    #[arg(long, env = "NETMOUNT_SECRET", hide_env_values = true, hide = true, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ============ Registry ============

    /// List registered shares with their live mount status
    List,

    /// Show one share
    Get(shares::GetArgs),

    /// Register a new share
    Create(Box<shares::CreateArgs>),

    /// Change fields of a share
    Update(Box<shares::UpdateArgs>),

    /// Forget an unmounted share and remove its mount point
    Delete(shares::GetArgs),

    // ============ Mounting ============

    /// Mount a share (or every auto-mount share)
    Mount(mounts::MountArgs),

    /// Unmount a share (or all mounted shares)
    Unmount(mounts::UnmountArgs),

    // ============ Discovery ============

    /// Query servers without touching the registry
    #[command(subcommand)]
    Discover(DiscoverCommands),
}

#[derive(Subcommand)]
enum DiscoverCommands {
    /// List the shares or exports a server offers
    Shares(discover::SharesArgs),

    /// Check that a share is reachable with the given credentials
    Test(Box<discover::TestArgs>),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            // Quiet is parsed separately so parse failures still honour it
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let settings = Config::load(cli.config.as_deref())?
        .resolve()
        .context("Failed to resolve configuration")?;
    tracing::debug!(?settings, "Configuration loaded");

    let manager = commands::build_manager(&settings, cli.secret.as_deref());
    let mode = OutputMode {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::List => shares::list(&manager, mode),
        Commands::Get(args) => shares::get(&manager, &args, mode),
        Commands::Create(args) => shares::create(&manager, *args, mode),
        Commands::Update(args) => shares::update(&manager, *args, mode),
        Commands::Delete(args) => shares::delete(&manager, &args, mode),
        Commands::Mount(args) => mounts::mount(&manager, &args, mode),
        Commands::Unmount(args) => mounts::unmount(&manager, &args, mode),
        Commands::Discover(DiscoverCommands::Shares(args)) => {
            discover::shares(&manager, &args, mode)
        }
        Commands::Discover(DiscoverCommands::Test(args)) => discover::test(&manager, &args, mode),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<ManagerError>() {
            return match err {
                ManagerError::Validation(_) => exit_code::USAGE_ERROR,
                ManagerError::NotFound(_) => exit_code::NOT_FOUND,
                ManagerError::Conflict(_) | ManagerError::Lock(LockError::Busy { .. }) => {
                    exit_code::CONFLICT
                }
                ManagerError::FeatureDisabled => exit_code::FEATURE_DISABLED,
                ManagerError::MissingSecret | ManagerError::Credential(_) => {
                    exit_code::CREDENTIAL_FAILED
                }
                ManagerError::Mount(_) => exit_code::MOUNT_FAILED,
                ManagerError::Discovery(_) => exit_code::DISCOVERY_FAILED,
                ManagerError::Store(_) | ManagerError::Lock(_) => exit_code::GENERAL_ERROR,
            };
        }

        if cause.downcast_ref::<ValidationError>().is_some() {
            return exit_code::USAGE_ERROR;
        }
        if cause.downcast_ref::<CryptoError>().is_some() {
            return exit_code::CREDENTIAL_FAILED;
        }
        if cause.downcast_ref::<PartialFailure>().is_some() {
            return exit_code::PARTIAL_FAILURE;
        }
        if cause.downcast_ref::<ConnectionFailed>().is_some() {
            return exit_code::DISCOVERY_FAILED;
        }
    }

    exit_code::GENERAL_ERROR
}
