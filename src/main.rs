//! Graft CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Build a typed property graph from a source repository", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Optional TOML config file; CLI flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving nodes.json / edges.json
    #[arg(short, long, default_value = ".graft")]
    out: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository: hierarchy plus reference resolution
    Build {
        /// Environment tag prefixed to all identifiers
        #[arg(long)]
        environment: Option<String>,
    },
    /// Index the hierarchy only (no language servers)
    Hierarchy,
    /// Partial rebuild for a set of changed files
    Diff {
        /// JSON file holding the list of file diffs
        #[arg(long)]
        diffs: PathBuf,

        /// JSON file holding previous node states, if any
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Diff identifier labeling this run's environment
        #[arg(long, default_value = "diff")]
        diff_identifier: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("graft={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Graft v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Build { environment } => {
            commands::build(cli.root, cli.config, cli.out, environment).await
        }
        Commands::Hierarchy => commands::hierarchy(cli.root, cli.config, cli.out).await,
        Commands::Diff {
            diffs,
            previous,
            diff_identifier,
        } => commands::diff(cli.root, cli.config, cli.out, diffs, previous, diff_identifier).await,
        Commands::Version => {
            println!("Graft v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
