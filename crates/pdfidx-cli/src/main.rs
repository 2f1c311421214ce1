mod commands;
mod signal;
mod workspace;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use signal::CancelHandle;
use workspace::Workspace;

#[derive(Parser)]
#[command(
    name = "pdfidx",
    version,
    about = "Personal PDF document indexing: scan, ingest, and search a library of PDFs",
    long_about = "pdfidx scans directories of PDFs, carves them into content-addressed\n\
        pages, and keeps a combined full-text and vector index over the result.\n\n\
        Quick start:\n  \
        pdfidx commit-sources papers=~/Documents/papers\n  \
        pdfidx scan\n  \
        pdfidx query \"quarterly revenue\""
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace directory (default: ~/.pdfidx)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Path to an explicit config file, applied after the workspace's own
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or retire named scan roots
    ///
    /// Each argument is NAME=PATH. Any previously-committed scope left out
    /// of the call is dropped along with every file it had on record.
    ///
    /// Example: pdfidx commit-sources papers=~/Documents/papers
    CommitSources {
        /// One or more NAME=PATH entries
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Diff committed sources against the last snapshot and ingest changes
    Scan,
    /// Run a hybrid lexical/vector search
    Query {
        /// Search text
        text: String,

        /// Maximum number of results to return
        #[arg(long, default_value_t = pdfidx_core::constants::DEFAULT_QUERY_LIMIT)]
        limit: usize,
    },
    /// Show the workspace location, committed scopes, and pending events
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let workspace = Workspace::discover(cli.workspace.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::CommitSources { sources } => commands::commit_sources::run(&workspace, &sources),
        Commands::Scan => {
            let cancel = CancelHandle::install()?;
            commands::scan::run(&workspace, &cancel)
        }
        Commands::Query { text, limit } => commands::query::run(&workspace, &text, limit),
        Commands::Status => commands::status::run(&workspace),
    }
}
