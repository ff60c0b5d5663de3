//! Structure Store - Main Server

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use structure_store::{store::MemoryGraphStore, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "structure-store")]
#[command(about = "Versioned software-structure store")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, env = "STRUCTURE_STORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config.yaml and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot file to restore from and flush to
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Print node counts of a snapshot
    Stats {
        /// Snapshot file (defaults to the configured one)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,structure_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, snapshot } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }
            structure_store::start_server(config).await
        }
        Commands::Stats { snapshot } => {
            let Some(path) = snapshot.or(config.snapshot_path) else {
                bail!("no snapshot configured; pass --snapshot or set STORE_SNAPSHOT_PATH");
            };
            let store = MemoryGraphStore::open(&path).await?;
            println!("{}", serde_json::to_string_pretty(&store.stats().await)?);
            Ok(())
        }
    }
}
