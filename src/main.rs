//! Ethereum deposit-address clustering tool
//!
//! # NOTE
//! - Results are heuristic. A cluster is statistical evidence of related
//!   activity, not proof of common ownership.
//! - The Etherscan API caps paged history at 10,000 results per address;
//!   high-volume addresses yield partial data and are flagged as such.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use clusterscan::cli::commands;
use clusterscan::config::Config;

/// Ethereum deposit-address clustering via the Etherscan API
#[derive(Parser)]
#[command(name = "clusterscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward clustering: find deposit addresses the user funds that
    /// forward to known exchanges
    Cluster {
        /// Ethereum address to analyze
        address: String,
    },

    /// Backward analysis: find known exchange addresses that funded the
    /// target
    Funding {
        /// Ethereum address to analyze
        address: String,
    },

    /// Interactive analysis menu
    Menu,

    /// Show current configuration (API key masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clusterscan=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Cluster { address } => commands::cluster(&config, &address).await,
        Commands::Funding { address } => commands::funding(&config, &address).await,
        Commands::Menu => commands::menu(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
