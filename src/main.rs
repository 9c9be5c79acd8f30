//! packdex CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "packdex")]
#[command(about = "Incremental indexer and build pipeline for add-on projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the project and update the cache
    Index,
    /// Show a file's node, links and transitive directory
    Graph {
        /// Project-relative file path
        path: String,
    },
    /// Scan and run one build pass
    Build {
        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build, then rebuild on every change
    Watch {
        /// Quiet period before a batch of changes is built, in milliseconds
        #[arg(long, default_value = "200")]
        debounce: u64,
    },
    /// Clear the cache
    Clear {
        /// Also delete build output
        #[arg(long)]
        all: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "packdex={0},packdex_core={0},packdex_indexer={0},packdex_pipeline={0},packdex_watcher={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("packdex v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root),
        Commands::Graph { path } => commands::graph(cli.root, &path),
        Commands::Build { json } => commands::build(cli.root, json),
        Commands::Watch { debounce } => commands::watch(cli.root, debounce).await,
        Commands::Clear { all } => commands::clear(cli.root, all),
        Commands::Version => {
            println!("packdex v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
