//! mshell client
//!
//! Interactive shell on the target, reached through the relay:
//! - `mshell` connects and reads commands from stdin
//! - `mshell keygen <name>` writes a new keypair

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mshell::commands;
use mshell_core::config::{self, ClientConfig};

#[derive(Parser)]
#[command(name = "mshell")]
#[command(author, version, about = "Remote shell through the mshell relay")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Relay address (overrides config)
    #[arg(short, long)]
    address: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an X25519 keypair
    Keygen {
        /// Base name for the key files
        name: String,
        /// Directory to write <name>.key and <name>.pub into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Some(Commands::Keygen { name, dir }) => commands::keygen_command(&name, &dir),
        None => {
            let config_path = cli
                .config
                .unwrap_or_else(|| config::default_config_dir().join("mshell.toml"));
            let mut config: ClientConfig = config::load_config(&config_path)
                .with_context(|| format!("Failed to load config from {:?}", config_path))?;

            if let Some(address) = cli.address {
                config.mshell.address = address;
            }

            commands::shell_command(config).await
        }
    }
}
