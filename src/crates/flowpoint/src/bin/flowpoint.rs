//! flowpoint CLI - checkpoint administration
//!
//! Main entry point for the flowpoint command-line tool.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use flowpoint::cli::{self, checkpoint};
use flowpoint::{logging, version, ConfigLoader};

#[derive(Parser)]
#[command(name = "flowpoint")]
#[command(about = "flowpoint - checkpoint and undo-log administration", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Override the configured log level (e.g. "debug", "flowpoint=trace")
    #[arg(long, global = true, env = "FLOWPOINT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default configuration and database
    Init,

    /// Show version information
    Version,

    /// List active (unresolved) checkpoints
    Active {
        /// Only checkpoints of this case
        #[arg(short, long)]
        case: Option<i64>,
    },

    /// List finished checkpoints, newest first
    History {
        /// Only checkpoints of this case
        #[arg(short, long)]
        case: Option<i64>,
    },

    /// Show a checkpoint and its undo log
    Show {
        /// Checkpoint ID
        id: String,
    },

    /// Undo every change of an active checkpoint
    Rollback {
        /// Checkpoint ID
        id: String,
    },

    /// Undo a finished checkpoint and everything accepted after it
    Restore {
        /// Checkpoint ID
        id: String,
    },

    /// Delete a checkpoint and its undo log without undoing anything
    Delete {
        /// Checkpoint ID
        id: String,
    },

    /// Delete all checkpoints and undo logs
    Purge {
        /// Only checkpoints of this case
        #[arg(short, long)]
        case: Option<i64>,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new().context("Failed to locate configuration")?;
    let mut config = loader.load().await.context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging)?;

    let command = match cli.command {
        Some(Commands::Init) => {
            return cli::handle_init(&loader, &config).await.map_err(|e| {
                eprintln!("{}", format!("✗ Initialization failed: {}", e).red());
                e.into()
            });
        }
        Some(Commands::Version) => {
            println!("{}", version::full_version());
            return Ok(());
        }
        None => {
            println!("{}", version::full_version());
            println!("\nUse --help to see available commands");
            return Ok(());
        }
        Some(command) => command,
    };

    let manager = cli::open_manager(&loader, &config)
        .await
        .context("Failed to open checkpoint database (run 'flowpoint init' first?)")?;

    let result = match command {
        Commands::Active { case } => checkpoint::handle_active(&manager, case).await,
        Commands::History { case } => checkpoint::handle_history(&manager, case).await,
        Commands::Show { id } => checkpoint::handle_show(&manager, id).await,
        Commands::Rollback { id } => checkpoint::handle_rollback(&manager, id).await,
        Commands::Restore { id } => checkpoint::handle_restore(&manager, id).await,
        Commands::Delete { id } => checkpoint::handle_delete(&manager, id).await,
        Commands::Purge { case, yes } => checkpoint::handle_purge(&manager, case, yes).await,
        Commands::Init | Commands::Version => unreachable!("handled before opening the database"),
    };

    manager.database().close().await;

    if let Err(e) = &result {
        eprintln!("{}", format!("✗ {}", e).red());
    }
    result.map_err(Into::into)
}
