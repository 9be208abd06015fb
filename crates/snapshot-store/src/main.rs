use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;
use snapshot_store::SnapshotStore;

#[derive(Parser)]
#[command(name = "procwatch-store")]
#[command(about = "Inspect and maintain a procwatch snapshot database")]
#[command(version)]
struct Cli {
    /// Path of the SQLite database
    #[arg(long, env = "PROCWATCH_DATABASE", default_value = "procwatch.db")]
    database: PathBuf,

    /// Reject payloads whose api_key does not match
    #[arg(long, env = "PROCWATCH_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a snapshot payload from a JSON file
    Ingest { file: PathBuf },
    /// List active hosts
    Hosts,
    /// Latest snapshot of every active host
    Latest,
    /// Latest snapshot of one host
    Host {
        hostname: String,
        /// Print the last snapshot headers instead of the full snapshot
        #[arg(long)]
        history: Option<u32>,
    },
    /// Delete snapshots older than the retention window
    Prune,
    /// Hide a host from listings, keeping its data
    Deactivate { hostname: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::builder()
        .parse_env(env_logger::Env::new().filter_or("PROCWATCH_LOG", "info"))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut store = SnapshotStore::open(&cli.database)
        .await
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    if let Some(api_key) = cli.api_key {
        store = store.with_api_key(api_key);
    }
    debug!("Opened snapshot database at {}", cli.database.display());

    let result = execute(&store, cli.command).await;
    store.close().await;
    result
}

async fn execute(store: &SnapshotStore, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { file } => {
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let receipt = store.ingest(&body, None).await?;
            print_json(&receipt)
        }
        Commands::Hosts => print_json(&store.list_hosts().await?),
        Commands::Latest => print_json(&store.latest_snapshots().await?),
        Commands::Host {
            hostname,
            history: Some(limit),
        } => print_json(&store.host_history(&hostname, limit).await?),
        Commands::Host {
            hostname,
            history: None,
        } => print_json(&store.host_snapshot(&hostname).await?),
        Commands::Prune => {
            let deleted = store.clear_old_data(Utc::now()).await?;
            info!("Cleared {deleted} old snapshots");
            Ok(())
        }
        Commands::Deactivate { hostname } => {
            store.set_host_active(&hostname, false).await?;
            info!("Host {hostname} deactivated");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
