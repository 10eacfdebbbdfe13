//! event-ingest command line

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::run::{RunArgs, handle_run};

#[derive(Parser)]
#[command(name = "event-ingest", version, about = "Import tabular files into event datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one file through the import pipeline and print its progress report
    Run {
        /// CSV or JSON file to import
        file: PathBuf,
        /// File format (csv, json); guessed from the extension when omitted
        #[arg(long)]
        format: Option<String>,
        /// Dataset language for field role detection (ISO 639)
        #[arg(long, default_value = "eng")]
        language: String,
        /// Pipeline configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Approve schema changes that would otherwise suspend the import
        #[arg(long)]
        auto_approve: bool,
        /// Recurring source identity used for resubmission detection
        #[arg(long)]
        source_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            format,
            language,
            config,
            auto_approve,
            source_key,
        } => {
            handle_run(&RunArgs {
                file,
                format,
                language,
                config,
                auto_approve,
                source_key,
            })
            .await
        }
    }
}
