//! Order cache CLI - payload tooling and migrations.
//!
//! # Usage
//!
//! ```bash
//! # Validate an order payload offline
//! oc-cli check order.json
//!
//! # Publish an order payload to the orders subject
//! oc-cli publish order.json
//!
//! # Apply the database schema
//! oc-cli migrate
//! ```
//!
//! # Commands
//!
//! - `check` - Decode and validate a payload file
//! - `publish` - Send a payload file to NATS
//! - `migrate` - Run database migrations

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "oc-cli")]
#[command(author, version, about = "Order cache CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and validate an order payload file
    Check {
        /// Path to the JSON payload
        file: PathBuf,
    },
    /// Publish an order payload file to the orders subject
    Publish {
        /// Path to the JSON payload
        file: PathBuf,

        /// Publish even if the payload is not a valid order
        #[arg(long)]
        skip_check: bool,
    },
    /// Run database migrations
    Migrate {
        /// Directory holding the migration files
        #[arg(short, long, default_value = "crates/service/migrations")]
        source: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Check { file } => commands::payload::check(&file).await?,
        Commands::Publish { file, skip_check } => {
            commands::payload::publish(&file, skip_check).await?;
        }
        Commands::Migrate { source } => commands::migrate::run(&source).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publish_flags() {
        let cli = Cli::parse_from(["oc-cli", "publish", "--skip-check", "order.json"]);
        assert!(matches!(
            cli.command,
            Commands::Publish { ref file, skip_check: true } if file == &PathBuf::from("order.json")
        ));
    }

    #[test]
    fn test_migrate_default_source() {
        let cli = Cli::parse_from(["oc-cli", "migrate"]);
        assert!(matches!(
            cli.command,
            Commands::Migrate { ref source } if source == &PathBuf::from("crates/service/migrations")
        ));
    }
}
