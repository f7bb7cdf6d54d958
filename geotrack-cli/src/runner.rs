//! Shared setup for commands that run the engine.

use std::path::Path;

use geotrack::config::{config_file_path, ConfigFile};
use geotrack::logging::{init_logging, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the installed logging subscriber.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load configuration and initialize logging.
    ///
    /// `--verbose` overrides the configured level with `debug`.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config = load_config(config_path)?;

        let mut logging = config.logging.clone();
        if verbose {
            logging.level = "debug".to_string();
        }
        let guard = init_logging(&logging)?;

        Ok(Self {
            config,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command,
            freshness_minutes = self.config.engine.freshness_minutes,
            max_concurrent_fetches = self.config.engine.max_concurrent_fetches,
            "GeoTrack starting"
        );
    }
}

/// Load from an explicit path, or the default location.
pub fn load_config(config_path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match config_path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load_from(&config_file_path()?)?,
    };
    Ok(config)
}
