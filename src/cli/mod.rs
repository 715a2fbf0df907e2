//! CLI parser and command dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "rankqueue")]
#[command(about = "Task queue engine for blog rank tracking")]
#[command(version)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and run migrations
    Init,

    /// Start the web trigger server
    Serve,

    /// Fan a task family out into its queue
    Enqueue {
        /// Task family (serp, blog_rank, visitor, keyword_metrics,
        /// notification, refresh)
        family: String,
    },

    /// Drain a task family's queue until empty
    Drain {
        /// Task family to drain
        family: String,
    },

    /// Show queue depths for all families
    Status,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings).await,
        Commands::Serve => commands::cmd_serve(settings).await,
        Commands::Enqueue { family } => commands::cmd_enqueue(&settings, &family).await,
        Commands::Drain { family } => commands::cmd_drain(&settings, &family).await,
        Commands::Status => commands::cmd_status(&settings).await,
    }
}
