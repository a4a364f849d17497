//! Tracing initialization

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set. Installing twice is an
/// error, so call this once from the binary.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    installed.map_err(|e| Error::Configuration(format!("tracing already initialized: {e}")))?;

    tracing::debug!("Tracing initialized at level {}", config.level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_fails() {
        let config = LogConfig::default();
        // The first call may lose against another test's subscriber
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(Error::Configuration(_))));
    }
}
