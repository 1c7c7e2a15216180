//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::AeolusConfig;
use crate::engine::{AssetLoader, FsAssetLoader, SimulatedBackend};
use crate::env::sound_environment::parse_local_time;
use crate::env::{
    generate_music_profile, resolve_condition_key, update_sound_environment, MusicProfile,
    SoundEnvironment,
};
use crate::error::{AeolusError, Result};
use crate::mixer::{BusName, JsonFileStore, VolumePreferences};
use crate::session::{CycleOutcome, NowPlaying, SceneOrchestrator, StatusSink};
use crate::weather::{
    Coordinates, NullTelemetry, StaticWeather, TelemetrySink, WeatherProvider, WeatherReport,
};

/// Prints status to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleStatusSink;

impl StatusSink for ConsoleStatusSink {
    fn status(&self, line: &str) {
        println!("{}", line);
    }

    fn now_playing(&self, record: &NowPlaying) {
        println!("{:-<60}", "");
        println!("{} {}", record.date, record.time);
        println!("Ambient: {}", record.ambient_track);
        println!(
            "Scene:   {} / {} / {} / {}",
            record.condition, record.biome, record.season, record.time_of_day
        );
        println!(
            "Band:    {} bpm in {} ({})",
            record.bpm, record.key, record.genre
        );
        println!(
            "Drone:   {:?} | Chimes: {:?}",
            record.drone_status, record.chime_status
        );
        println!("{:-<60}", "");
    }
}

/// Options of the `run` command.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub coords: Option<Coordinates>,
    pub weather_file: Option<PathBuf>,
    pub cycles: Option<usize>,
    pub seed: Option<u64>,
}

/// Run a headless session until Ctrl-C or the cycle limit.
pub async fn run(opts: RunOptions) -> Result<()> {
    let config = AeolusConfig::load(opts.config.as_deref())?;
    let coords = opts.coords.unwrap_or(config.location);
    info!("Starting headless session at {}", coords);

    let mut builder = SceneOrchestrator::builder(
        Arc::new(SimulatedBackend::new()),
        asset_loader(&config)?,
        weather_source(&config, opts.weather_file.as_deref())?,
    )
    .coordinates(coords)
    .telemetry(telemetry_sink(&config)?)
    .status(Arc::new(ConsoleStatusSink))
    .preferences(open_preferences(&config)?)
    .timings(config.timings.clone());
    if let Some(seed) = opts.seed {
        builder = builder.seed(seed);
    }
    let scene = builder.build();
    scene.initialize().await?;

    let (shutdown, signal) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping scene");
            let _ = shutdown.send(true);
        }
    });

    let outcomes = scene.run_cycles(opts.cycles, signal).await;
    let played = outcomes
        .iter()
        .filter(|o| matches!(o, CycleOutcome::Played))
        .count();
    println!("Session finished: {} of {} cycles played", played, outcomes.len());
    Ok(())
}

fn weather_source(
    config: &AeolusConfig,
    weather_file: Option<&Path>,
) -> Result<Arc<dyn WeatherProvider>> {
    if let Some(path) = weather_file {
        info!("Serving weather from {}", path.display());
        return Ok(Arc::new(StaticWeather::from_file(path)?));
    }
    api_client(config)?.ok_or_else(|| AeolusError::InvalidConfig {
        reason: "no weather source: pass --weather-file or set AEOLUS_WEATHER_API_KEY"
            .to_string(),
    })
}

#[cfg(feature = "http")]
fn api_client(config: &AeolusConfig) -> Result<Option<Arc<dyn WeatherProvider>>> {
    match &config.weather_api_key {
        Some(key) => Ok(Some(Arc::new(crate::weather::WeatherApiClient::new(
            config.weather_url.as_str(),
            key.as_str(),
        )?))),
        None => Ok(None),
    }
}

#[cfg(not(feature = "http"))]
fn api_client(_config: &AeolusConfig) -> Result<Option<Arc<dyn WeatherProvider>>> {
    Ok(None)
}

fn asset_loader(config: &AeolusConfig) -> Result<Arc<dyn AssetLoader>> {
    if config.remote_assets() {
        return remote_assets(config);
    }
    Ok(Arc::new(FsAssetLoader::new(config.asset_root.as_str())))
}

#[cfg(feature = "http")]
fn remote_assets(config: &AeolusConfig) -> Result<Arc<dyn AssetLoader>> {
    Ok(Arc::new(crate::engine::HttpAssetLoader::new(
        config.asset_root.as_str(),
    )?))
}

#[cfg(not(feature = "http"))]
fn remote_assets(_config: &AeolusConfig) -> Result<Arc<dyn AssetLoader>> {
    Err(AeolusError::InvalidConfig {
        reason: "remote assets need the http feature".to_string(),
    })
}

#[cfg(feature = "http")]
fn telemetry_sink(config: &AeolusConfig) -> Result<Arc<dyn TelemetrySink>> {
    match &config.telemetry_url {
        Some(url) => Ok(Arc::new(crate::weather::HttpTelemetry::new(url.as_str())?)),
        None => Ok(Arc::new(NullTelemetry)),
    }
}

#[cfg(not(feature = "http"))]
fn telemetry_sink(config: &AeolusConfig) -> Result<Arc<dyn TelemetrySink>> {
    if config.telemetry_url.is_some() {
        warn!("Telemetry URL set but the http feature is off");
    }
    Ok(Arc::new(NullTelemetry))
}

fn open_preferences(config: &AeolusConfig) -> Result<VolumePreferences> {
    let store = JsonFileStore::open(&config.preferences_path)?;
    Ok(VolumePreferences::new(Arc::new(store)))
}

/// Environment and profile for a report, as printed by `profile`.
#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub environment: SoundEnvironment,
    pub profile: MusicProfile,
}

/// Derive the environment and music profile for `report` at `at` (local
/// wall time, defaults to now).
pub fn derive_profile(report: &WeatherReport, at: Option<&str>) -> Result<ProfileReport> {
    let now = match at {
        Some(text) => parse_at(text)?,
        None => Local::now().naive_local(),
    };
    let mut environment = SoundEnvironment::default();
    update_sound_environment(&mut environment, report, now)?;
    let profile = generate_music_profile(&environment);
    environment.apply_profile(&profile);
    Ok(ProfileReport {
        environment,
        profile,
    })
}

fn parse_at(text: &str) -> Result<NaiveDateTime> {
    parse_local_time(text).ok_or_else(|| AeolusError::InvalidConfig {
        reason: format!("invalid time '{}', expected YYYY-MM-DD HH:MM", text),
    })
}

/// Print the derived environment and profile as JSON.
pub fn profile(weather_file: &Path, at: Option<&str>) -> Result<()> {
    info!("Deriving profile from {}", weather_file.display());

    let content = fs::read_to_string(weather_file)?;
    let report: WeatherReport = serde_json::from_str(&content)?;
    let derived = derive_profile(&report, at)?;

    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}

/// Print the catalog bucket of a condition phrase.
pub fn resolve(condition: &str) -> Result<()> {
    let key = resolve_condition_key(condition);
    if !condition.trim().eq_ignore_ascii_case(key) {
        info!("'{}' resolves to '{}'", condition, key);
    }
    println!("{}", key);
    Ok(())
}

fn preferences_for(config: Option<&Path>) -> Result<VolumePreferences> {
    let config = AeolusConfig::load(config)?;
    open_preferences(&config)
}

/// Print the saved volume of a layer.
pub fn volume_get(config: Option<&Path>, layer: BusName) -> Result<f64> {
    let volume = preferences_for(config)?.volume(layer);
    println!("{}: {}", layer.preference_key(), volume);
    Ok(volume)
}

/// Save a layer volume, clamped to [0, 1].
pub fn volume_set(config: Option<&Path>, layer: BusName, value: f64) -> Result<f64> {
    let saved = preferences_for(config)?.set_volume(layer, value)?;
    if saved != value {
        warn!("Volume {} clamped to {}", value, saved);
    }
    println!("{}: {}", layer.preference_key(), saved);
    Ok(saved)
}
