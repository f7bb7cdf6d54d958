//! Configuration CLI commands.
//!
//! Provides `config path` and `config show`.

use std::path::Path;

use clap::Subcommand;
use geotrack::config::{config_file_path, ConfigFile};

use crate::error::CliError;
use crate::runner::load_config;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective settings
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Show => run_show(config_path),
    }
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    for line in render(&config) {
        println!("{}", line);
    }
    Ok(())
}

/// Settings in INI layout.
fn render(config: &ConfigFile) -> Vec<String> {
    let directory = config
        .logging
        .directory
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string());

    vec![
        "[engine]".to_string(),
        format!("  freshness_minutes = {}", config.engine.freshness_minutes),
        format!(
            "  max_concurrent_fetches = {}",
            config.engine.max_concurrent_fetches
        ),
        format!(
            "  reject_older_observations = {}",
            config.engine.reject_older_observations
        ),
        String::new(),
        "[logging]".to_string(),
        format!("  level = {}", config.logging.level),
        format!("  directory = {}", directory),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults() {
        let lines = render(&ConfigFile::default());
        assert!(lines.contains(&"  freshness_minutes = 15".to_string()));
        assert!(lines.contains(&"  max_concurrent_fetches = 16".to_string()));
        assert!(lines.contains(&"  directory = (not set)".to_string()));
    }

    #[test]
    fn test_show_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\nfreshness_minutes = 5\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine.freshness_minutes, 5);
        assert!(run_show(Some(&path)).is_ok());
    }

    #[test]
    fn test_show_rejects_bad_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\nmax_concurrent_fetches = many\n").unwrap();

        assert!(matches!(run_show(Some(&path)), Err(CliError::Config(_))));
    }
}
