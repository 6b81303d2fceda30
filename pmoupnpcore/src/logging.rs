//! Initialisation du logging `tracing`.
//!
//! Le niveau vient de `RUST_LOG` s'il est défini, sinon de
//! `log.min_level` ; la sortie console suit `log.enable_console`.

use anyhow::{Result, anyhow};
use pmoconfig::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filtre de niveau : `RUST_LOG`, puis la configuration, puis `info`.
pub fn log_filter(config: &Config) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match config.get_log_min_level() {
        Ok(l) => l.to_lowercase(),
        Err(_) => "info".to_string(),
    };
    EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installe le subscriber global.
///
/// Échoue si un subscriber est déjà installé.
pub fn init_logging(config: &Config) -> Result<()> {
    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let console = enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(log_filter(config))
        .with(console)
        .try_init()
        .map_err(|e| anyhow!("Cannot install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_follows_config_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = Config::embedded().unwrap();
        config.set_log_min_level("DEBUG".to_string()).unwrap();
        assert_eq!(log_filter(&config).to_string(), "debug");
    }
}
