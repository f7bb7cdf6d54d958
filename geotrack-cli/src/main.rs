//! GeoTrack CLI - Command-line interface
//!
//! Drives the synchronization engine against an in-memory store and exposes
//! the geodesy and configuration helpers of the `geotrack` library.

mod commands;
mod error;
mod runner;
mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "geotrack")]
#[command(version, about = "Live location synchronization for followed users", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a JSON scenario against an in-memory store and print every event
    Replay {
        /// Path to the scenario file
        scenario: PathBuf,
    },

    /// Great-circle distance between two coordinates
    #[command(allow_negative_numbers = true)]
    Distance {
        /// Latitude of the first point in degrees
        lat1: f64,
        /// Longitude of the first point in degrees
        lon1: f64,
        /// Latitude of the second point in degrees
        lat2: f64,
        /// Longitude of the second point in degrees
        lon2: f64,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Replay { scenario } => {
            commands::replay::run(&scenario, cli.config.as_deref(), cli.verbose)
        }
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => commands::distance::run(lat1, lon1, lat2, lon2),
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    }
}
