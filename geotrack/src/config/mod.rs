//! Configuration file handling.
//!
//! Settings live in an INI file, by default `<config_dir>/geotrack/config.ini`:
//!
//! ```ini
//! [engine]
//! freshness_minutes = 15
//! max_concurrent_fetches = 16
//! reject_older_observations = true
//!
//! [logging]
//! level = info
//! directory = /var/log/geotrack
//! ```
//!
//! A missing file yields defaults. Unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::sync::{EngineConfig, DEFAULT_FRESHNESS_WINDOW, DEFAULT_MAX_CONCURRENT_FETCHES};

const SECTION_ENGINE: &str = "engine";
const SECTION_LOGGING: &str = "logging";

/// Errors loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The file could not be written.
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key holds a value of the wrong shape.
    #[error("Invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    /// No platform configuration directory is available.
    #[error("Could not determine the configuration directory")]
    NoConfigDir,
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub freshness_minutes: u64,
    pub max_concurrent_fetches: usize,
    pub reject_older_observations: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            freshness_minutes: DEFAULT_FRESHNESS_WINDOW.as_secs() / 60,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            reject_older_observations: true,
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
}

/// Default location of the configuration file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("geotrack").join("config.ini"))
        .ok_or(ConfigError::NoConfigDir)
}

impl ConfigFile {
    /// Load from the default path, falling back to defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path()?)
    }

    /// Load from `path`, falling back to defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SECTION_ENGINE)) {
            if let Some(value) = section.get("freshness_minutes") {
                let minutes: u64 = parse_value(SECTION_ENGINE, "freshness_minutes", value)?;
                // Must be representable in seconds
                if minutes.checked_mul(60).is_none() {
                    return Err(ConfigError::InvalidValue {
                        section: SECTION_ENGINE,
                        key: "freshness_minutes",
                        value: value.to_string(),
                    });
                }
                config.engine.freshness_minutes = minutes;
            }
            if let Some(value) = section.get("max_concurrent_fetches") {
                config.engine.max_concurrent_fetches =
                    parse_value(SECTION_ENGINE, "max_concurrent_fetches", value)?;
            }
            if let Some(value) = section.get("reject_older_observations") {
                config.engine.reject_older_observations =
                    parse_value(SECTION_ENGINE, "reject_older_observations", value)?;
            }
        }

        if let Some(section) = ini.section(Some(SECTION_LOGGING)) {
            if let Some(level) = section.get("level") {
                config.logging.level = level.trim().to_string();
            }
            if let Some(directory) = section.get("directory") {
                let directory = directory.trim();
                config.logging.directory =
                    (!directory.is_empty()).then(|| PathBuf::from(directory));
            }
        }

        Ok(config)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some(SECTION_ENGINE))
            .set("freshness_minutes", self.engine.freshness_minutes.to_string())
            .set(
                "max_concurrent_fetches",
                self.engine.max_concurrent_fetches.to_string(),
            )
            .set(
                "reject_older_observations",
                self.engine.reject_older_observations.to_string(),
            );

        let mut logging = ini.with_section(Some(SECTION_LOGGING));
        logging.set("level", self.logging.level.as_str());
        if let Some(directory) = &self.logging.directory {
            logging.set("directory", directory.to_string_lossy().to_string());
        }

        ini.write_to_file(path).map_err(write_err)
    }

    /// Engine configuration described by this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_freshness_window(Duration::from_secs(self.engine.freshness_minutes.saturating_mul(60)))
            .with_max_concurrent_fetches(self.engine.max_concurrent_fetches)
            .with_reject_older_observations(self.engine.reject_older_observations)
    }
}

fn parse_value<T: FromStr>(
    section: &'static str,
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("config.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.engine.freshness_minutes, 15);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.engine.freshness_minutes = 5;
        config.engine.max_concurrent_fetches = 4;
        config.engine.reject_older_observations = false;
        config.logging.level = "debug".to_string();
        config.logging.directory = Some(PathBuf::from("/tmp/geotrack-logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\nfreshness_minutes = 30\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.engine.freshness_minutes, 30);
        assert_eq!(config.engine.max_concurrent_fetches, 16);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\nreject_older_observations = maybe\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "reject_older_observations",
                ..
            }
        ));
        assert!(err.to_string().contains("engine.reject_older_observations"));
    }

    #[test]
    fn test_freshness_minutes_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\nfreshness_minutes = 307445734561825861\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "freshness_minutes",
                ..
            }
        ));

        // Largest accepted value still converts
        std::fs::write(&path, format!("[engine]\nfreshness_minutes = {}\n", u64::MAX / 60)).unwrap();
        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(
            config.engine_config().freshness_window,
            Duration::from_secs(u64::MAX / 60 * 60)
        );
    }

    #[test]
    fn test_engine_config_saturates() {
        let mut config = ConfigFile::default();
        config.engine.freshness_minutes = u64::MAX;
        assert_eq!(config.engine_config().freshness_window, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_engine_config() {
        let mut config = ConfigFile::default();
        config.engine.freshness_minutes = 2;
        config.engine.max_concurrent_fetches = 3;

        let engine = config.engine_config();
        assert_eq!(engine.freshness_window, Duration::from_secs(120));
        assert_eq!(engine.max_concurrent_fetches, 3);
        assert!(engine.reject_older_observations);
    }
}
