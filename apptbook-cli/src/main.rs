//! Apptbook licensing command line
//!
//! Runs the same activation flow the desktop app runs at startup:
//! 1. Report this machine's id so the vendor can issue a license
//! 2. Check or activate the local license file
//! 3. Import a license file the user received
//!
//! Usage:
//!   apptbook machine-id
//!   apptbook import ~/Downloads/license.json
//!
//! Everything is offline; nothing here talks to a server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use apptbook_cli::{default_data_dir, log_filter, render_audit, render_status, resolve_config};
use apptbook_db::SqliteStore;
use apptbook_license::LicenseManager;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "apptbook")]
#[command(about = "Offline license activation for Apptbook")]
struct Args {
    /// Directory holding the license file, public key and database
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file (defaults to apptbook.toml in the data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this machine's id
    MachineId,
    /// Print the stored license record
    Status,
    /// Run the startup check (activates from the license file if needed)
    Check,
    /// Activate from a license file
    Activate {
        /// License file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Copy a license file into place and activate it
    Import {
        /// The license file to import; must be named like the configured one
        path: PathBuf,
    },
    /// Print recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let rust_log = std::env::var("RUST_LOG").ok();
    FmtSubscriber::builder()
        .with_env_filter(log_filter(args.verbose, rust_log.as_deref()))
        .with_target(false)
        .compact()
        .init();

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    let config = resolve_config(&data_dir, args.config.as_deref())?;
    debug!("Using data directory {:?}", data_dir);

    let store = Arc::new(
        SqliteStore::open(&config.database_file)
            .with_context(|| format!("Failed to open {}", config.database_file.display()))?,
    );
    let manager = LicenseManager::from_config(Arc::clone(&store), &config);

    let ok = match args.command {
        Command::MachineId => {
            println!("{}", manager.get_current_machine_id());
            true
        }
        Command::Status => {
            let record = manager
                .license_record()
                .context("Failed to read license record")?;
            print!("{}", render_status(record.as_ref()));
            true
        }
        Command::Check => report(manager.check_activation_status()),
        Command::Activate { file } => {
            let path = file.unwrap_or_else(|| config.license_file.clone());
            info!("Activating from {:?}", path);
            report(manager.activate_from_file(&path))
        }
        Command::Import { path } => {
            let activated = manager
                .import_license_file(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            report(activated)
        }
        Command::Audit { limit } => {
            let entries = store
                .audit_log(limit, 0)
                .context("Failed to read audit log")?;
            print!("{}", render_audit(&entries));
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn report(active: bool) -> bool {
    if active {
        println!("License active");
    } else {
        println!("License not active; run `apptbook status` for details");
    }
    active
}
