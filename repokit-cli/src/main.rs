use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::config::ConfigCommands;
use commands::partition::PartitionCommands;

/// repokit - inspect configuration and render partition layouts
#[derive(Parser)]
#[command(name = "repokit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render partition DDL fragments
    Partition {
        #[command(subcommand)]
        command: PartitionCommands,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Check that the configured database is reachable
    Ping {
        /// Configuration file
        #[arg(long, default_value = repokit::config::DEFAULT_CONFIG_FILE)]
        path: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Partition { command } => commands::partition::execute(command),
        Commands::Config { command } => commands::config::execute(command),
        Commands::Ping { path } => commands::db::ping(&path).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
