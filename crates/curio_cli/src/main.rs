//! Curio CLI
//!
//! Command-line tools for a Curio data directory.
//!
//! # Commands
//!
//! - `inspect` - Display the stored domains and photo blobs
//! - `recent` - Mark an item as viewed
//! - `delete` - Delete an item from every domain
//! - `sync` - Run one full sync against a shared directory

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Curio data directory tools.
#[derive(Parser)]
#[command(name = "curio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    data: Option<PathBuf>,

    /// JSON file with the read-only catalog
    #[arg(global = true, short, long)]
    catalog: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the stored domains and photo blobs
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Mark an item as viewed
    Recent {
        /// Item id
        id: String,
    },

    /// Delete an item from every domain
    Delete {
        /// Item id
        id: String,
    },

    /// Push and pull once against a shared directory
    Sync {
        /// Shared mirror directory
        #[arg(short, long)]
        mirror: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let catalog = cli.catalog.as_deref();
    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.data.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&path, catalog, &format)?;
        }
        Commands::Recent { id } => {
            let path = cli.data.ok_or("Data directory required for recent")?;
            commands::recent::run(&path, catalog, &id).await?;
        }
        Commands::Delete { id } => {
            let path = cli.data.ok_or("Data directory required for delete")?;
            commands::delete::run(&path, catalog, &id).await?;
        }
        Commands::Sync { mirror } => {
            let path = cli.data.ok_or("Data directory required for sync")?;
            commands::sync::run(&path, catalog, &mirror).await?;
        }
        Commands::Version => {
            println!("Curio CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
