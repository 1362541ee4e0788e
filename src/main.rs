// ABOUTME: CLI entry point for pg-insert-export
// ABOUTME: Parses commands, sets up logging and cancellation, and routes to handlers

use clap::{Parser, Subcommand};
use pg_insert_export::commands::{self, ExportArgs};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pg-insert-export")]
#[command(
    about = "Export database tables as a portable script of SQL INSERT statements",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export tables into a single INSERT script
    Export {
        /// PostgreSQL URL or SQLite file (.db, .sqlite, .sqlite3)
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        source: String,
        /// TOML file with tables and defaults
        #[arg(long)]
        config: Option<String>,
        /// Table to export (format: schema.table[:key1+key2][:page_size], repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
        /// JSON-designated columns (format: table.column, comma-separated)
        #[arg(long, value_delimiter = ',')]
        json_columns: Vec<String>,
        /// Columns exported as NULL (format: table.column, comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_columns: Vec<String>,
        /// Output file (default: insertdata.sql)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Write the script to stdout instead of a file
        #[arg(long)]
        stdout: bool,
        /// Default rows per page
        #[arg(long)]
        page_size: Option<u64>,
        /// Emit SET search_path TO <schema>; at the top of the script
        #[arg(long)]
        search_path: Option<String>,
        /// Per-page query timeout in seconds (default: 60)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Retries per failed page (default: 3)
        #[arg(long)]
        max_retries: Option<u32>,
        /// Stage finished tables and reuse them after an interrupted run
        #[arg(long, conflicts_with = "no_resume")]
        resume: bool,
        /// Discard staging left by an interrupted run
        #[arg(long)]
        no_resume: bool,
        /// Omit the generated-at header line for reproducible output
        #[arg(long)]
        no_timestamp: bool,
        /// Overwrite an existing output file without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current page");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Export {
            source,
            config,
            tables,
            json_columns,
            exclude_columns,
            output,
            stdout,
            page_size,
            search_path,
            timeout_secs,
            max_retries,
            resume,
            no_resume,
            no_timestamp,
            yes,
        } => {
            let args = ExportArgs {
                source,
                config,
                tables,
                json_columns,
                exclude_columns,
                output,
                stdout,
                page_size,
                search_path,
                timeout_secs,
                max_retries,
                resume,
                no_resume,
                no_timestamp,
                yes,
            };
            commands::export(args, cancel).await
        }
    }
}
