//! Scene orchestrator
//!
//! Runs the session lifecycle:
//! - `initialize`: resume audio, build the buses, restore saved volumes
//! - `run_cycle`: fade out, fetch weather, rebuild every layer, report
//! - `run`: one cycle per interval until shutdown
//! - `stop_all`: fade out and release everything
//!
//! Only one cycle runs at a time; a cycle requested while another is in
//! flight is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::state::SessionState;
use super::status::{
    status_line, NowPlaying, StatusSink, TracingStatusSink, FETCH_FAILED_STATUS,
    INCOMPLETE_WEATHER_STATUS,
};
use crate::config::Timings;
use crate::engine::{AssetLoader, AudioBackend, Transport};
use crate::env::{AmbientCatalog, MusicProfile, SoundEnvironment};
use crate::error::{AeolusError, Result};
use crate::layers::{
    AmbientLayer, BandLayer, ChimeLayer, DroneLayer, LayerContext, Readiness, SceneLayer,
};
use crate::mixer::{FadeController, GainBusRegistry, VolumePreferences};
use crate::weather::{
    Coordinates, FixedLocation, LocationProvider, NullTelemetry, TelemetryRecord, TelemetrySink,
    WeatherProvider, WeatherReport,
};

/// Result of one scene cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Every layer was rebuilt for fresh weather.
    Played,
    /// The cycle (and its retry, if any) failed.
    Aborted(String),
    /// Another cycle was already running.
    Skipped,
}

/// Clears the in-flight flag however the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Builder for [`SceneOrchestrator`].
pub struct SessionBuilder {
    backend: Arc<dyn AudioBackend>,
    assets: Arc<dyn AssetLoader>,
    weather: Arc<dyn WeatherProvider>,
    location: Option<Arc<dyn LocationProvider>>,
    telemetry: Arc<dyn TelemetrySink>,
    status: Option<Arc<dyn StatusSink>>,
    preferences: VolumePreferences,
    catalog: AmbientCatalog,
    timings: Timings,
    seed: Option<u64>,
}

impl SessionBuilder {
    pub fn location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = Some(location);
        self
    }

    /// Shorthand for a [`FixedLocation`].
    pub fn coordinates(self, coords: Coordinates) -> Self {
        self.location(Arc::new(FixedLocation::new(coords)))
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    /// Run without any status sink.
    pub fn without_status(mut self) -> Self {
        self.status = None;
        self
    }

    pub fn preferences(mut self, preferences: VolumePreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn catalog(mut self, catalog: AmbientCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Fix the layers' random choices.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> SceneOrchestrator {
        let registry = Arc::new(GainBusRegistry::new(self.backend.clone()));
        let fades = FadeController::new(registry.clone(), self.preferences);
        let transport = Arc::new(Transport::default());
        let ctx = LayerContext {
            backend: self.backend.clone(),
            fades: fades.clone(),
            assets: self.assets,
            transport: transport.clone(),
            timings: self.timings.clone(),
            seed: self.seed,
        };

        let drone = Arc::new(DroneLayer::new(ctx.clone()));
        let chimes = Arc::new(ChimeLayer::new(ctx.clone()));
        let band = BandLayer::new(ctx.clone(), drone.clone(), chimes.clone());
        let ambient = Arc::new(AmbientLayer::new(ctx, self.catalog));
        let location = self
            .location
            .unwrap_or_else(|| Arc::new(FixedLocation::new(Coordinates::new(51.5072, -0.1276))));

        SceneOrchestrator {
            timings: self.timings,
            backend: self.backend,
            registry,
            fades,
            transport,
            ambient,
            drone,
            chimes,
            band,
            weather: self.weather,
            location,
            telemetry: self.telemetry,
            status: self.status,
            state: Mutex::new(SessionState::new()),
            cycle_running: AtomicBool::new(false),
        }
    }
}

/// Owns every layer and drives them from weather.
pub struct SceneOrchestrator {
    timings: Timings,
    backend: Arc<dyn AudioBackend>,
    registry: Arc<GainBusRegistry>,
    fades: FadeController,
    transport: Arc<Transport>,
    ambient: Arc<AmbientLayer>,
    drone: Arc<DroneLayer>,
    chimes: Arc<ChimeLayer>,
    band: Arc<BandLayer>,
    weather: Arc<dyn WeatherProvider>,
    location: Arc<dyn LocationProvider>,
    telemetry: Arc<dyn TelemetrySink>,
    status: Option<Arc<dyn StatusSink>>,
    state: Mutex<SessionState>,
    cycle_running: AtomicBool,
}

impl SceneOrchestrator {
    /// Start building a session around its three required collaborators.
    pub fn builder(
        backend: Arc<dyn AudioBackend>,
        assets: Arc<dyn AssetLoader>,
        weather: Arc<dyn WeatherProvider>,
    ) -> SessionBuilder {
        SessionBuilder {
            backend,
            assets,
            weather,
            location: None,
            telemetry: Arc::new(NullTelemetry),
            status: Some(Arc::new(TracingStatusSink)),
            preferences: VolumePreferences::in_memory(),
            catalog: AmbientCatalog::builtin(),
            timings: Timings::default(),
            seed: None,
        }
    }

    pub fn ambient(&self) -> &Arc<AmbientLayer> {
        &self.ambient
    }

    pub fn drone(&self) -> &Arc<DroneLayer> {
        &self.drone
    }

    pub fn chimes(&self) -> &Arc<ChimeLayer> {
        &self.chimes
    }

    pub fn band(&self) -> &Arc<BandLayer> {
        &self.band
    }

    pub fn fades(&self) -> &FadeController {
        &self.fades
    }

    pub fn registry(&self) -> &Arc<GainBusRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Copy of the session state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Override the weather-derived environment for subsequent cycles,
    /// or clear the override with `None`.
    pub async fn set_manual_environment(&self, env: Option<SoundEnvironment>) {
        let mut state = self.state.lock().await;
        match env {
            Some(env) => state.set_manual_environment(env),
            None => state.clear_manual_environment(),
        }
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::SeqCst)
    }

    /// Resume the audio context, create the buses and bring them to their
    /// saved volumes.
    pub async fn initialize(&self) -> Result<()> {
        if !self.backend.is_running() {
            self.backend.resume()?;
        }
        self.registry.initialize_buses()?;
        self.fades.restore_all(self.timings.layer_fade());
        let session = self.state.lock().await.id;
        info!(session = %session, "Scene initialized");
        Ok(())
    }

    /// Run one weather cycle, retrying once with the last known coordinates
    /// when the first attempt fails.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.cycle_running.swap(true, Ordering::SeqCst) {
            warn!("Cycle already in progress, skipping");
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard(&self.cycle_running);

        let first = match self.location.locate().await {
            Ok(coords) => self.play_cycle(coords).await,
            Err(e) => Err(e),
        };
        let Err(e) = first else {
            return CycleOutcome::Played;
        };
        self.report_failure(&e);

        let Some(coords) = self.state.lock().await.last_coords() else {
            return CycleOutcome::Aborted(e.to_string());
        };
        info!(%coords, "Retrying with last known coordinates");
        match self.play_cycle(coords).await {
            Ok(()) => CycleOutcome::Played,
            Err(e) => {
                self.report_failure(&e);
                CycleOutcome::Aborted(e.to_string())
            }
        }
    }

    async fn play_cycle(&self, coords: Coordinates) -> Result<()> {
        self.fades.fade_out_all(self.timings.scene_fade()).await;
        self.halt_layers().await;
        tokio::time::sleep(self.timings.settle()).await;

        debug!(%coords, "Fetching weather");
        let report = self.weather.fetch(coords).await?;
        let env = {
            let mut state = self.state.lock().await;
            state.apply_report(&report, Local::now().naive_local())?;
            state.remember_coords(coords);
            state.environment().clone()
        };

        let (ambient, chimes, band) = tokio::join!(
            self.ambient.play_from_weather(&env),
            self.chimes.preload(),
            self.band.preload(),
        );
        let layers = [
            (self.ambient.name(), ambient),
            (self.chimes.name(), chimes),
            (self.band.name(), band),
        ];
        for (layer, readiness) in layers {
            if let Readiness::Degraded(reason) = readiness {
                warn!(layer, %reason, "Layer degraded");
            }
        }

        let profile = self.band.start(&env).await?;
        let env = {
            let mut state = self.state.lock().await;
            state.record_profile(&profile);
            state.cycles += 1;
            state.environment().clone()
        };

        self.publish(&report, &env, &profile).await;
        self.post_telemetry(report, coords);
        Ok(())
    }

    fn report_failure(&self, e: &AeolusError) {
        error!(error = %e, code = e.error_code(), "Scene cycle failed");
        let line = match e {
            AeolusError::IncompleteWeather { .. } => INCOMPLETE_WEATHER_STATUS,
            _ => FETCH_FAILED_STATUS,
        };
        if let Some(status) = &self.status {
            status.status(line);
        }
    }

    async fn publish(&self, report: &WeatherReport, env: &SoundEnvironment, profile: &MusicProfile) {
        let Some(status) = &self.status else {
            return;
        };
        if let Ok((current, location)) = report.require_complete() {
            status.status(&status_line(location, current));
        }

        let now = Local::now();
        let record = NowPlaying {
            time: now.format("%H:%M").to_string(),
            date: now.format("%a %d %b %Y").to_string(),
            condition: report.condition_text().to_string(),
            biome: env.biome.clone(),
            season: env.season,
            time_of_day: env.time_of_day,
            ambient_track: self.ambient.current_track(),
            drone_status: self.drone.is_live().await.into(),
            chime_status: self.chimes.is_live().await.into(),
            weather: report.clone(),
            astro: report.astro().cloned(),
            bpm: profile.bpm,
            key: profile.key.clone(),
            genre: profile.genre,
        };
        status.now_playing(&record);
    }

    /// Post telemetry without holding up the cycle.
    fn post_telemetry(&self, report: WeatherReport, coords: Coordinates) {
        let record = match TelemetryRecord::from_report(&report, coords, Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping telemetry");
                return;
            }
        };
        let sink = self.telemetry.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.post(&record).await {
                warn!(error = %e, "Telemetry post failed");
            }
        });
    }

    async fn halt_layers(&self) {
        self.band.stop(Duration::ZERO).await;
        self.ambient.stop(Duration::ZERO).await;
        self.drone.stop(Duration::ZERO).await;
        self.chimes.stop(Duration::ZERO).await;
    }

    /// Fade everything out, release every layer and park the transport.
    pub async fn stop_all(&self) {
        self.fades.fade_out_all(self.timings.scene_fade()).await;
        self.halt_layers().await;
        self.transport.stop();
        self.transport.cancel_all();
        info!("Scene stopped");
    }

    /// Run cycles every `cycle_interval` until `shutdown` turns true or its
    /// sender is dropped, then stop everything.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Vec<CycleOutcome> {
        self.run_cycles(None, shutdown).await
    }

    /// Like [`run`](Self::run), but ends on its own after `limit` cycles
    /// have each played out their interval.
    pub async fn run_cycles(
        &self,
        limit: Option<usize>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();
        while !*shutdown.borrow() {
            let outcome = self.run_cycle().await;
            info!(cycle = outcomes.len() + 1, outcome = ?outcome, "Cycle finished");
            outcomes.push(outcome);

            let stop = tokio::select! {
                _ = tokio::time::sleep(self.timings.cycle_interval()) => false,
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop || limit.is_some_and(|n| outcomes.len() >= n) {
                break;
            }
        }
        self.stop_all().await;
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SimulatedBackend, StaticAssetLoader};
    use crate::session::MemoryStatusSink;
    use crate::weather::StaticWeather;

    fn orchestrator(
        weather: StaticWeather,
    ) -> (SceneOrchestrator, Arc<SimulatedBackend>, Arc<MemoryStatusSink>) {
        let backend = Arc::new(SimulatedBackend::new());
        let status = Arc::new(MemoryStatusSink::new());
        let scene = SceneOrchestrator::builder(
            backend.clone(),
            Arc::new(StaticAssetLoader::new()),
            Arc::new(weather),
        )
        .status(status.clone())
        .seed(11)
        .build();
        (scene, backend, status)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_restores_volumes() {
        let (scene, backend, _) = orchestrator(StaticWeather::new(WeatherReport::default()));
        scene.initialize().await.unwrap();
        assert!(backend.is_running());
        assert!(scene.registry().is_initialized());

        tokio::time::sleep(Duration::from_secs(11)).await;
        let prefs = scene.fades().preferences().clone();
        for bus in crate::mixer::BusName::ALL {
            let value = scene.fades().bus_value(bus).unwrap();
            assert!((value - prefs.volume(bus)).abs() < 1e-9, "{} at {}", bus, value);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_report_without_fallback_aborts() {
        let (scene, _, status) = orchestrator(StaticWeather::new(WeatherReport::default()));
        scene.initialize().await.unwrap();

        let outcome = scene.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Aborted(_)));
        assert_eq!(status.lines(), vec![INCOMPLETE_WEATHER_STATUS.to_string()]);
        assert!(!scene.band().is_live().await);
        assert!(!scene.is_cycle_running());
        assert_eq!(scene.snapshot().await.cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_reports_failure() {
        let weather = StaticWeather::sequence(vec![Err(AeolusError::WeatherFetch {
            reason: "offline".to_string(),
        })]);
        let (scene, _, status) = orchestrator(weather);
        scene.initialize().await.unwrap();

        assert!(matches!(scene.run_cycle().await, CycleOutcome::Aborted(_)));
        assert_eq!(status.last_line().as_deref(), Some(FETCH_FAILED_STATUS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cycle_is_skipped() {
        let (scene, _, _) = orchestrator(StaticWeather::new(WeatherReport::default()));
        scene.initialize().await.unwrap();

        let (first, second) = tokio::join!(scene.run_cycle(), scene.run_cycle());
        assert!(matches!(first, CycleOutcome::Aborted(_)));
        assert_eq!(second, CycleOutcome::Skipped);
    }
}
