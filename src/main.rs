// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use opkgmirror::index::IndexBuilder;
use opkgmirror::index::opkg::OpkgIndexGenerator;
use opkgmirror::orchestrator::{Orchestrator, RunSummary};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "opkgmirror")]
#[command(author, version, about = "Mirror upstream release packages into a signed opkg repository", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync all sources and republish the indexes of changed buckets
    Sync {
        /// Path to the source catalog (JSON)
        #[arg(short, long, default_value = "repo_sources.json")]
        sources: PathBuf,
        /// Repository root directory
        #[arg(short, long, default_value = "/var/www/opkg_repo")]
        root: PathBuf,
        /// usign secret key for index signing (index stays unsigned if omitted)
        #[arg(short, long)]
        key: Option<PathBuf>,
    },
    /// Rebuild index artifacts for every architecture without syncing
    Publish {
        /// Path to the source catalog (JSON)
        #[arg(short, long, default_value = "repo_sources.json")]
        sources: PathBuf,
        /// Repository root directory
        #[arg(short, long, default_value = "/var/www/opkg_repo")]
        root: PathBuf,
        /// usign secret key for index signing (index stays unsigned if omitted)
        #[arg(short, long)]
        key: Option<PathBuf>,
    },
    /// Generate a usign-compatible Ed25519 keypair
    Keygen {
        /// Output basename (writes <name>.key and <name>.pub)
        #[arg(short, long, default_value = "repo")]
        output: PathBuf,
        /// Comment embedded in the key files
        #[arg(short, long, default_value = "opkg repository")]
        comment: String,
    },
}

fn print_summary(summary: &RunSummary) {
    println!("Sources checked:  {}", summary.sources_checked);
    println!("Assets installed: {}", summary.assets_installed);
    println!("Buckets rebuilt:  {}", summary.buckets_rebuilt);
    for warning in &summary.warnings {
        println!("warning: {}", warning);
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { sources, root, key } => {
            info!("Starting sync against catalog {}", sources.display());
            let builder = IndexBuilder::new(Box::new(OpkgIndexGenerator), key);
            let orchestrator = Orchestrator::new(root, builder)?;
            let summary = orchestrator.run(&sources)?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Publish { sources, root, key } => {
            info!("Republishing indexes for catalog {}", sources.display());
            let builder = IndexBuilder::new(Box::new(OpkgIndexGenerator), key);
            let orchestrator = Orchestrator::new(root, builder)?;
            let summary = orchestrator.publish(&sources)?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Keygen { output, comment } => {
            let fingerprint = opkgmirror::sign::generate_keypair(&output, &comment)?;
            println!(
                "Keys {}.key and {}.pub created. ID: {}",
                output.display(),
                output.display(),
                fingerprint
            );
            Ok(())
        }
    }
}
