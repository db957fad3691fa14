//! Portage Demon - tracks Portage syncs and world updates in the background
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pdemon_app::config::{self, DEFAULT_CONFIG_PATH};
use pdemon_core::logging;

/// Portage Demon - tracks Portage syncs and world updates
#[derive(Parser, Debug)]
#[command(name = "pdemon", version)]
#[command(about = "Tracks Portage syncs, world updates and pending packages", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for the daemon's own log files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon (default)
    Run,

    /// Parse emerge.log once and print the last sync and world update
    Scan {
        /// emerge.log to read instead of the configured one
        #[arg(long, value_name = "PATH")]
        log: Option<PathBuf>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the persisted status
    Status,

    /// Write a default configuration file if none exists
    InitConfig,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            logging::init(args.log_dir.as_deref())?;
            let settings = config::load_settings(&args.config);
            portage_demon::run_daemon(settings).await?;
        }
        Command::Scan { log, json } => {
            logging::init_stderr();
            let settings = config::load_settings(&args.config);
            portage_demon::run_scan(&settings, log.as_deref(), json)?;
        }
        Command::Status => {
            logging::init_stderr();
            let settings = config::load_settings(&args.config);
            portage_demon::run_status(&settings)?;
        }
        Command::InitConfig => {
            logging::init_stderr();
            if config::init_config(&args.config)? {
                eprintln!("Wrote {}", args.config.display());
            } else {
                eprintln!("{} already exists", args.config.display());
            }
        }
    }

    Ok(())
}
