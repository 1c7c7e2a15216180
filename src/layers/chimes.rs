//! Chime layer
//!
//! Preloads a small set of wind-chime samples, then fires bursts of panned
//! hits on a fixed interval for the length of a session. Gusty weather makes
//! bursts larger. Every hit is tuned to the band's key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{release_nodes, wait_for, LayerContext, Readiness, SceneLayer};
use crate::engine::pitch::pitch_class;
use crate::engine::{lock, DecodedBuffer, NodeId, NodeSpec};
use crate::env::key_root;
use crate::error::{AeolusError, Result};
use crate::mixer::BusName;
use crate::weather::Current;

/// Sample files loaded by [`ChimeLayer::preload`].
pub const CHIME_FILES: [&str; 6] = [
    "chimes/large_chime_1_d.wav",
    "chimes/large_chime_2_eb.wav",
    "chimes/large_chime_3_g.wav",
    "chimes/large_chime_4_a.wav",
    "chimes/large_chime_5_bb.wav",
    "chimes/large_chime_6_d.wav",
];

/// Gain applied to each hit before panning.
pub const HIT_GAIN: f64 = 0.05;

/// Playback rate per pitch class, C through B.
const KEY_RATES: [f64; 12] = [
    1.0, 1.06, 1.12, 1.19, 1.26, 1.34, 1.42, 1.5, 1.59, 1.68, 1.78, 1.89,
];

const OCTAVE_FACTORS: [f64; 2] = [0.5, 1.0];

/// Number of hits in a burst for gust speed `gust` and a draw `r` in
/// `[0, 1)`.
///
/// # Example
/// ```
/// use aeolus::layers::burst_size;
/// assert_eq!(burst_size(40.0, 0.0), 1);
/// assert_eq!(burst_size(40.0, 0.999), 12);
/// ```
pub fn burst_size(gust: f64, r: f64) -> usize {
    let spread = (gust.max(0.0) / 4.0).floor() + 2.0;
    1 + (r.clamp(0.0, 1.0) * spread).floor().min(spread - 1.0) as usize
}

/// Base playback rate for a key such as `A minor`.
pub fn chime_rate(key: &str) -> f64 {
    pitch_class(key_root(key))
        .map(|class| KEY_RATES[class as usize])
        .unwrap_or(1.0)
}

/// Weather and key a burst loop plays against.
#[derive(Debug, Clone, PartialEq)]
pub struct ChimeConditions {
    pub wind_kph: Option<f64>,
    pub gust_kph: Option<f64>,
    pub key: String,
}

impl ChimeConditions {
    pub fn new(current: Option<&Current>, key: impl Into<String>) -> Self {
        Self {
            wind_kph: current.and_then(|c| c.wind_kph),
            gust_kph: current.and_then(|c| c.gust_kph),
            key: key.into(),
        }
    }
}

/// Live hits by voice id: player, pre-gain, panner.
type VoiceTable = Arc<Mutex<HashMap<u64, [NodeId; 3]>>>;

struct ChimeSession {
    burst_loop: JoinHandle<()>,
}

/// State shared between the layer and its burst loop.
struct ChimeShared {
    ctx: LayerContext,
    samples: Mutex<Vec<DecodedBuffer>>,
    enabled: AtomicBool,
    pitch_test: AtomicBool,
    rng: Mutex<StdRng>,
    voices: VoiceTable,
    voice_timers: Mutex<JoinSet<()>>,
    next_voice: AtomicU64,
}

pub struct ChimeLayer {
    shared: Arc<ChimeShared>,
    session: tokio::sync::Mutex<Option<ChimeSession>>,
}

impl ChimeLayer {
    pub fn new(ctx: LayerContext) -> Self {
        let rng = Mutex::new(ctx.rng(3));
        Self {
            shared: Arc::new(ChimeShared {
                ctx,
                samples: Mutex::new(Vec::new()),
                enabled: AtomicBool::new(true),
                pitch_test: AtomicBool::new(false),
                rng,
                voices: Arc::new(Mutex::new(HashMap::new())),
                voice_timers: Mutex::new(JoinSet::new()),
                next_voice: AtomicU64::new(0),
            }),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Flip the half-rate comparison mode. Returns the new setting.
    pub fn toggle_pitch_test(&self) -> bool {
        let lowered = !self.shared.pitch_test.fetch_xor(true, Ordering::SeqCst);
        info!(lowered, "Chime pitch test mode toggled");
        lowered
    }

    pub fn sample_count(&self) -> usize {
        lock(&self.shared.samples).len()
    }

    /// Number of hits still holding nodes.
    pub fn live_voices(&self) -> usize {
        lock(&self.shared.voices).len()
    }

    /// Load the chime samples, tolerating individual failures
    ///
    /// Resumes the audio context first if it is not running.
    pub async fn preload(&self) -> Readiness {
        let ctx = &self.shared.ctx;
        if !ctx.backend.is_running() {
            warn!("Audio context not running at chime preload, resuming");
            if let Err(e) = ctx.backend.resume() {
                return Readiness::Degraded(e.to_string());
            }
        }

        let mut loads = JoinSet::new();
        for path in CHIME_FILES {
            let assets = Arc::clone(&ctx.assets);
            loads.spawn(async move { (path, assets.load(path).await) });
        }

        let mut loaded = Vec::with_capacity(CHIME_FILES.len());
        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok((_, Ok(buffer))) if buffer.is_playable() => loaded.push(buffer),
                Ok((path, Ok(_))) => warn!(path, "Chime sample is empty"),
                Ok((path, Err(e))) => warn!(path, error = %e, "Chime sample failed to load"),
                Err(e) => warn!(error = %e, "Chime load task failed"),
            }
        }
        // Keep a stable order regardless of completion order.
        loaded.sort_by(|a, b| a.path.cmp(&b.path));

        let count = loaded.len();
        *lock(&self.shared.samples) = loaded;
        if count == 0 {
            let e = AeolusError::NoChimesLoaded {
                attempted: CHIME_FILES.len(),
            };
            error!(error = %e, "Chimes unavailable");
            return Readiness::Degraded(e.to_string());
        }
        info!(count, "Chime samples loaded");
        Readiness::Ready
    }

    /// Fade the bus in and start the burst loop, replacing any running loop.
    pub async fn start(&self, conditions: ChimeConditions) {
        self.stop(Duration::ZERO).await;
        if !self.is_enabled() || self.sample_count() == 0 {
            debug!("Chimes disabled or not loaded, not starting");
            return;
        }

        let timings = &self.shared.ctx.timings;
        let session = timings.chime_session();
        self.shared
            .ctx
            .fades
            .ramp_to_preference(BusName::Chimes, timings.layer_fade());

        let burst_loop = tokio::spawn(run_bursts(
            Arc::clone(&self.shared),
            conditions,
            Instant::now() + session,
        ));
        *self.session.lock().await = Some(ChimeSession { burst_loop });
        info!(secs = session.as_secs_f64(), "Chimes started");
    }

    /// Fire one burst now. Returns the number of hits scheduled.
    pub fn play_burst(&self, conditions: &ChimeConditions) -> usize {
        self.shared.play_burst(conditions)
    }
}

async fn run_bursts(shared: Arc<ChimeShared>, conditions: ChimeConditions, deadline: Instant) {
    let period = shared.ctx.timings.chime_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if Instant::now() > deadline {
            break;
        }
        if !shared.enabled.load(Ordering::SeqCst) || !shared.ctx.transport.is_started() {
            continue;
        }
        shared.play_burst(&conditions);
    }

    info!("Chime session over, fading out");
    shared
        .ctx
        .fades
        .ramp_to_zero(BusName::Chimes, shared.ctx.timings.layer_fade());
}

impl ChimeShared {
    fn play_burst(&self, conditions: &ChimeConditions) -> usize {
        let (Some(_wind), Some(gust)) = (conditions.wind_kph, conditions.gust_kph) else {
            warn!("Missing wind data for chimes, skipping burst");
            return 0;
        };
        let bus = match self.ctx.bus(BusName::Chimes) {
            Ok(bus) => bus,
            Err(e) => {
                warn!(error = %e, "Chime bus unavailable");
                return 0;
            }
        };

        let mut base_rate = chime_rate(&conditions.key);
        if self.pitch_test.load(Ordering::SeqCst) {
            base_rate *= 0.5;
        }

        let hits: Vec<(DecodedBuffer, f64, f64, f64)> = {
            let samples = lock(&self.samples);
            let mut rng = lock(&self.rng);
            let size = burst_size(gust, rng.random::<f64>());
            (0..size)
                .filter_map(|i| {
                    let sample = samples.choose(&mut *rng)?.clone();
                    let pan = rng.random_range(-1.0..=1.0);
                    let octave = *OCTAVE_FACTORS.choose(&mut *rng)?;
                    let delay = i as f64 * (0.05 + 0.2 * rng.random::<f64>());
                    Some((sample, pan, base_rate * octave, delay))
                })
                .collect()
        };

        let mut played = 0;
        for (sample, pan, rate, delay) in hits {
            match self.spawn_voice(bus, sample, pan, rate, delay) {
                Ok(()) => played += 1,
                Err(e) => warn!(error = %e, "Chime hit failed"),
            }
        }
        debug!(hits = played, key = %conditions.key, gust, "Chime burst");
        played
    }

    fn spawn_voice(
        &self,
        bus: NodeId,
        buffer: DecodedBuffer,
        pan: f64,
        rate: f64,
        delay: f64,
    ) -> Result<()> {
        let backend = self.ctx.backend.as_ref();
        let player = backend.create(NodeSpec::Player {
            buffer,
            looping: false,
            playback_rate: rate,
        })?;
        let nodes = backend
            .create(NodeSpec::Gain { value: HIT_GAIN })
            .and_then(|gain| Ok((gain, backend.create(NodeSpec::Panner { pan })?)));
        let (gain, panner) = match nodes {
            Ok(pair) => pair,
            Err(e) => {
                release_nodes(backend, &[player]);
                return Err(e);
            }
        };
        let voice = [player, gain, panner];
        let wired = backend
            .connect(player, gain)
            .and_then(|_| backend.connect(gain, panner))
            .and_then(|_| backend.connect(panner, bus))
            .and_then(|_| backend.start(player, backend.now() + delay));
        if let Err(e) = wired {
            release_nodes(backend, &voice);
            return Err(e);
        }

        let id = self.next_voice.fetch_add(1, Ordering::SeqCst);
        lock(&self.voices).insert(id, voice);

        let voices = Arc::clone(&self.voices);
        let release_backend = Arc::clone(&self.ctx.backend);
        let timeout = self.ctx.timings.chime_voice_timeout();
        let mut timers = lock(&self.voice_timers);
        // Reap finished timers so the set does not grow for the whole session.
        while timers.try_join_next().is_some() {}
        timers.spawn(async move {
            tokio::time::sleep(timeout).await;
            let voice = lock(&voices).remove(&id);
            if let Some(voice) = voice {
                release_nodes(release_backend.as_ref(), &voice);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl SceneLayer for ChimeLayer {
    fn name(&self) -> &'static str {
        "chimes"
    }

    async fn is_live(&self) -> bool {
        let bursting = self
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.burst_loop.is_finished());
        bursting || self.live_voices() > 0
    }

    async fn stop(&self, fade: Duration) {
        let session = self.session.lock().await.take();
        let had_voices = self.live_voices() > 0;
        if session.is_none() && !had_voices {
            debug!("No chimes to stop");
            return;
        }
        if let Some(session) = session {
            session.burst_loop.abort();
        }

        let ctx = &self.shared.ctx;
        ctx.fades.ramp_to_zero(BusName::Chimes, fade);
        wait_for(fade).await;

        lock(&self.shared.voice_timers).abort_all();
        let voices: Vec<[NodeId; 3]> = lock(&self.shared.voices).drain().map(|(_, v)| v).collect();
        for voice in &voices {
            release_nodes(ctx.backend.as_ref(), voice);
        }
        info!(released = voices.len(), "Chimes stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::rig;
    use super::*;
    use crate::engine::{AudioBackend, StaticAssetLoader};
    use approx::assert_relative_eq;
    use test_case::test_case;

    fn all_chimes() -> StaticAssetLoader {
        CHIME_FILES
            .iter()
            .fold(StaticAssetLoader::new(), |loader, path| loader.with(path, 4.0))
    }

    fn gusty(gust: f64) -> ChimeConditions {
        ChimeConditions {
            wind_kph: Some(12.0),
            gust_kph: Some(gust),
            key: "A minor".to_string(),
        }
    }

    #[test]
    fn test_burst_size_bounds() {
        for i in 0..1000 {
            let r = i as f64 / 1000.0;
            let size = burst_size(40.0, r);
            assert!((1..=12).contains(&size), "size {} for r {}", size, r);
        }
        assert_eq!(burst_size(0.0, 0.0), 1);
        assert_eq!(burst_size(0.0, 0.99), 2);
    }

    #[test_case("C major", 1.0)]
    #[test_case("A minor", 1.68)]
    #[test_case("F# major", 1.42)]
    #[test_case("Bb minor", 1.78)]
    #[test_case("nonsense", 1.0)]
    fn test_chime_rate(key: &str, want: f64) {
        assert_relative_eq!(chime_rate(key), want);
    }

    #[tokio::test]
    async fn test_partial_preload_is_tolerated() {
        let assets = StaticAssetLoader::new()
            .with(CHIME_FILES[0], 4.0)
            .with(CHIME_FILES[3], 4.0);
        let rig = rig(assets);
        let layer = ChimeLayer::new(rig.ctx.clone());

        assert_eq!(layer.preload().await, Readiness::Ready);
        assert_eq!(layer.sample_count(), 2);
    }

    #[tokio::test]
    async fn test_total_preload_failure_degrades() {
        let rig = rig(StaticAssetLoader::new());
        let layer = ChimeLayer::new(rig.ctx.clone());
        assert!(matches!(layer.preload().await, Readiness::Degraded(_)));
    }

    #[tokio::test]
    async fn test_preload_resumes_context() {
        let rig = rig(all_chimes());
        let backend = Arc::new(crate::engine::SimulatedBackend::new());
        let ctx = LayerContext {
            backend: backend.clone(),
            ..rig.ctx.clone()
        };
        let layer = ChimeLayer::new(ctx);
        assert!(!backend.is_running());
        layer.preload().await;
        assert!(backend.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_voices_expire() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;

        let hits = layer.play_burst(&gusty(40.0));
        assert!((1..=12).contains(&hits));
        assert_eq!(layer.live_voices(), hits);
        assert_eq!(rig.layer_nodes(), hits * 3);

        let rates: Vec<f64> = rig
            .backend
            .live_nodes()
            .into_iter()
            .filter_map(|(id, spec)| match spec {
                NodeSpec::Player { .. } => rig.backend.playback_rate(id),
                _ => None,
            })
            .collect();
        for rate in rates {
            assert!(
                (rate - 1.68).abs() < 1e-9 || (rate - 0.84).abs() < 1e-9,
                "unexpected rate {}",
                rate
            );
        }

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(layer.live_voices(), 0);
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_gust_skips_burst() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;

        let conditions = ChimeConditions {
            gust_kph: None,
            ..gusty(40.0)
        };
        assert_eq!(layer.play_burst(&conditions), 0);
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pitch_test_halves_rate() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;
        assert!(layer.toggle_pitch_test());

        layer.play_burst(&gusty(0.0));
        for (id, spec) in rig.backend.live_nodes() {
            if let NodeSpec::Player { .. } = spec {
                let rate = rig.backend.playback_rate(id).unwrap();
                assert!(rate <= 0.84 + 1e-9, "rate {} not lowered", rate);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_for_transport() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;
        layer.start(gusty(20.0)).await;

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(layer.live_voices(), 0);

        rig.ctx.transport.start();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(layer.live_voices() > 0);

        layer.stop(Duration::ZERO).await;
        assert_eq!(layer.live_voices(), 0);
        assert_eq!(rig.layer_nodes(), 0);
        assert!(!layer.is_live().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_end_fades_bus() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;
        layer.start(gusty(20.0)).await;

        let bus = rig.ctx.bus(BusName::Chimes).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_relative_eq!(rig.backend.gain_value(bus).unwrap(), 0.5, epsilon = 1e-6);

        tokio::time::sleep(Duration::from_secs(295)).await;
        assert_eq!(rig.backend.gain_value(bus).unwrap(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_live_after_session_ends() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;
        rig.ctx.transport.start();
        layer.start(gusty(20.0)).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(layer.is_live().await);

        // Session of 300s, then the last voices time out.
        tokio::time::sleep(Duration::from_secs(260)).await;
        assert_eq!(layer.live_voices(), 0);
        assert!(!layer.is_live().await);

        layer.start(gusty(20.0)).await;
        assert!(layer.is_live().await);
        layer.stop(Duration::ZERO).await;
        assert!(!layer.is_live().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_loop() {
        let rig = rig(all_chimes());
        let layer = ChimeLayer::new(rig.ctx.clone());
        layer.preload().await;
        rig.ctx.transport.start();

        layer.start(gusty(0.0)).await;
        layer.start(gusty(0.0)).await;
        tokio::time::sleep(Duration::from_millis(3_600)).await;
        // One loop fires one burst of at most two hits.
        assert!((1..=2).contains(&layer.live_voices()));
    }
}
