use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
use commands::run::handle_run;
use commands::schema::handle_init_schema;
use commands::status::handle_status;

/// CLI for the CRM analytics ETL pipeline.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the ETL pipeline end to end.
    Run {
        /// Force a full (non-incremental) extraction.
        #[arg(long)]
        full: bool,
        /// Extract and transform without writing to the analytical store.
        #[arg(long)]
        dry_run: bool,
        /// Path to a TOML config file; built-in defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Start from the production preset instead of the defaults.
        #[arg(long, conflicts_with = "config")]
        production: bool,
    },
    /// Create the analytical tables if they do not exist.
    InitSchema,
    /// Show the bookkeeping left behind by the last load of each table.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            full,
            dry_run,
            config,
            production,
        } => handle_run(full, dry_run, config, production).await,
        Commands::InitSchema => handle_init_schema().await,
        Commands::Status => handle_status().await,
    }
}
