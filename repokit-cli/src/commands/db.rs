use anyhow::{Context, Result};
use colored::Colorize;
use repokit::config::Config;
use repokit::engine::sanitize_connection_url;
use repokit::observability::init_tracing;
use repokit::Engine;

pub async fn ping(path: &str) -> Result<()> {
    let config = Config::load_from(path).with_context(|| format!("Failed to load {path}"))?;
    init_tracing(&config.log)?;

    let target = sanitize_connection_url(&config.database.dsn);
    let engine = Engine::connect(&config.database)
        .await
        .with_context(|| format!("Failed to connect to {target}"))?;
    engine.ping().await?;
    engine.close().await;

    println!("{} {} ({:?})", "✓".green().bold(), target, engine.dialect());
    Ok(())
}
