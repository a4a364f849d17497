use anyhow::{Context, Result};
use clap::Subcommand;
use repokit::config::{Config, DEFAULT_CONFIG_FILE};
use repokit::engine::sanitize_connection_url;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as JSON with the password masked
    Show {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: String,
    },
}

pub fn execute(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show { path } => show(&path),
    }
}

fn show(path: &str) -> Result<()> {
    let config = Config::load_from(path).with_context(|| format!("Failed to load {path}"))?;
    println!("{}", render(config)?);
    Ok(())
}

fn render(mut config: Config) -> Result<String> {
    config.database.dsn = sanitize_connection_url(&config.database.dsn);
    Ok(serde_json::to_string_pretty(&config)?)
}
