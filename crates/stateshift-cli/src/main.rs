use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod config;

/// stateshift: move keyed records between storage backends without downtime.
///
/// Run bulk migrations and inspect records through the migration proxy.
#[derive(Parser)]
#[command(name = "stateshift", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "STATESHIFT_CONFIG",
        default_value = "stateshift.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every record the destination does not hold yet.
    Migrate {
        /// Override the configured number of parallel copies.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the configured scan page size.
        #[arg(long)]
        page_size: Option<usize>,

        /// Only migrate this record type. May be repeated.
        #[arg(long = "record-type")]
        record_types: Vec<String>,

        /// Print the final statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Count records per type in every configured backend.
    Status {
        /// Print the counts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Read one record through the migration proxy.
    Get { record_type: String, key: String },

    /// Remove one record from both backends.
    Clear { record_type: String, key: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match config::CliConfig::load(&cli.config) {
        Ok(config) => match cli.command {
            Commands::Migrate {
                concurrency,
                page_size,
                record_types,
                json,
            } => {
                let overrides = commands::MigrateOverrides {
                    concurrency,
                    page_size,
                    record_types,
                };
                commands::migrate(&config, overrides, json).await
            }
            Commands::Status { json } => commands::status(&config, json).await,
            Commands::Get { record_type, key } => commands::get(&config, &record_type, &key).await,
            Commands::Clear { record_type, key } => {
                commands::clear(&config, &record_type, &key).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
