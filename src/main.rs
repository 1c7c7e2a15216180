//! Aeolus CLI - Weather-Reactive Ambient Scene Engine
//!
//! Command-line interface for the Aeolus scene engine.

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use aeolus::cli::commands::{self, RunOptions};
use aeolus::cli::{Cli, Commands, VolumeAction};
use aeolus::weather::Coordinates;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Aeolus v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd).await,
        None => {
            println!("Aeolus v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Run {
            config,
            lat,
            lon,
            weather_file,
            cycles,
            seed,
        } => {
            let coords = lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon));
            commands::run(RunOptions {
                config,
                coords,
                weather_file,
                cycles,
                seed,
            })
            .await
            .context("scene session failed")
        }
        Commands::Profile { weather_file, at } => commands::profile(&weather_file, at.as_deref())
            .with_context(|| format!("cannot derive profile from {}", weather_file.display())),
        Commands::Resolve { condition } => Ok(commands::resolve(&condition)?),
        Commands::Volume { config, action } => {
            match action {
                VolumeAction::Get { layer } => {
                    commands::volume_get(config.as_deref(), layer)?;
                }
                VolumeAction::Set { layer, value } => {
                    commands::volume_set(config.as_deref(), layer, value)?;
                }
            }
            Ok(())
        }
    }
}
