use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use shelfd::core::credentials::{CredentialStore, FileCredentialStore};
use shelfd::logging::{self, LogConfig};
use shelfd::{config, core::Orchestrator};

#[derive(Parser)]
#[command(name = "shelfd")]
#[command(about = "E-book shelf appliance daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the appliance core.
    Daemon(DaemonArgs),
    /// Wipe stored Wi-Fi credentials so the next boot enters provisioning.
    ForgetCredentials,
}

#[derive(Args, Serialize)]
struct DaemonArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    library_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    reader_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    http_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    log_json: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Daemon(args) => config::AppConfig::new(Some(args))?,
        _ => config::AppConfig::new(None::<&DaemonArgs>)?,
    };

    logging::init(LogConfig {
        json: config.log_json,
        verbose: config.verbose,
    });

    match &cli.command {
        Commands::Daemon(_) => Orchestrator::new(config)
            .start()
            .await
            .context("daemon failed")?,
        Commands::ForgetCredentials => {
            let store = FileCredentialStore::new(config.credentials_path.clone());
            store
                .clear()
                .context("failed to clear stored credentials")?;
            println!("Stored Wi-Fi credentials cleared.");
        }
    }

    Ok(())
}
