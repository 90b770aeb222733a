//! askgate CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write the default config file
//! - `gateway`  — Start the HTTP gateway
//! - `doctor`   — Diagnose configuration and collaborators
//! - `history`  — Inspect, forget, or prune stored conversation turns

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "askgate",
    about = "askgate — guarded question answering over your documents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration and collaborator health
    Doctor,

    /// Operator access to the conversation log
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print a user's most recent turns, oldest first
    Show {
        #[arg(short, long)]
        user: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every turn stored for a user
    Forget {
        #[arg(short, long)]
        user: String,
    },

    /// Delete turns older than the retention window, for all users
    Prune,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::History { action } => match action {
            HistoryAction::Show { user, limit } => commands::history::show(&user, limit).await?,
            HistoryAction::Forget { user } => commands::history::forget(&user).await?,
            HistoryAction::Prune => commands::history::prune().await?,
        },
    }

    Ok(())
}
