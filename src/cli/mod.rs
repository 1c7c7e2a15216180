//! CLI Module
//!
//! Command-line interface for the Aeolus scene engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::mixer::BusName;

/// Aeolus - weather-reactive ambient scene engine
#[derive(Parser, Debug)]
#[command(name = "aeolus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a headless session on the simulated backend
    #[command(name = "run")]
    Run {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Latitude override
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude override
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Serve weather from a saved provider response instead of the API
        #[arg(long)]
        weather_file: Option<PathBuf>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Seed for the layers' random choices
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the environment and music profile derived from a weather file
    #[command(name = "profile")]
    Profile {
        /// Saved provider response (JSON)
        #[arg(long)]
        weather_file: PathBuf,

        /// Local time to derive for, "YYYY-MM-DD HH:MM"
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the catalog bucket for a condition phrase
    #[command(name = "resolve")]
    Resolve {
        /// Provider condition text, e.g. "Patchy rain possible"
        condition: String,
    },

    /// Read or write saved layer volumes
    #[command(name = "volume")]
    Volume {
        /// Configuration file (JSON)
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: VolumeAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum VolumeAction {
    /// Show the saved volume of a layer
    Get {
        /// Layer name, e.g. "ambient" or "droneVolume"
        layer: BusName,
    },

    /// Save a new volume for a layer
    Set {
        layer: BusName,

        /// Volume in [0, 1]
        value: f64,
    },
}
