//! Ambient bed layer
//!
//! Picks one field recording for the current condition and time of day and
//! loops it on the ambient bus. Load problems only silence this layer; they
//! never abort a cycle.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use super::{release_nodes, wait_for, LayerContext, Readiness, SceneLayer};
use crate::engine::{lock, DecodedBuffer, NodeId, NodeSpec};
use crate::env::{
    common_path, display_name, resolve_condition_key, time_of_day_path, AmbientCatalog,
    SoundEnvironment,
};
use crate::error::{AeolusError, Result};
use crate::mixer::BusName;

/// Track name reported before anything has been picked.
pub const AUTO_TRACK: &str = "Auto";

#[derive(Debug)]
struct AmbientVoice {
    player: NodeId,
    path: String,
}

pub struct AmbientLayer {
    ctx: LayerContext,
    catalog: AmbientCatalog,
    rng: Mutex<StdRng>,
    voice: tokio::sync::Mutex<Option<AmbientVoice>>,
    track: Mutex<String>,
}

impl AmbientLayer {
    pub fn new(ctx: LayerContext, catalog: AmbientCatalog) -> Self {
        let rng = Mutex::new(ctx.rng(1));
        Self {
            ctx,
            catalog,
            rng,
            voice: tokio::sync::Mutex::new(None),
            track: Mutex::new(AUTO_TRACK.to_string()),
        }
    }

    /// Display name of the bed last picked.
    pub fn current_track(&self) -> String {
        lock(&self.track).clone()
    }

    /// Asset path of the bed currently looping.
    pub async fn current_path(&self) -> Option<String> {
        self.voice.lock().await.as_ref().map(|v| v.path.clone())
    }

    /// Pick, load and fade in a bed for `env`, replacing any bed already
    /// playing.
    pub async fn play_from_weather(&self, env: &SoundEnvironment) -> Readiness {
        self.stop(Duration::ZERO).await;

        let condition = env.condition.as_deref().unwrap_or_default();
        let bucket = resolve_condition_key(condition);
        let file = {
            let files = self.catalog.files(env.time_of_day, bucket);
            let mut rng = lock(&self.rng);
            match files.choose(&mut *rng) {
                Some(file) => file.clone(),
                None => {
                    warn!(bucket, time_of_day = %env.time_of_day, "No ambient beds catalogued");
                    return Readiness::Degraded(format!("no beds for {}", bucket));
                }
            }
        };
        debug!(condition, bucket, file = %file, "Ambient bed selected");

        let path = self.locate(env, &file).await;
        *lock(&self.track) = display_name(&path);

        match self.start_player(&path).await {
            Ok(player) => {
                let previous = self.voice.lock().await.replace(AmbientVoice {
                    player,
                    path: path.clone(),
                });
                // A concurrent play stored its bed after our initial stop.
                if let Some(previous) = previous {
                    debug!(path = %previous.path, "Replacing ambient bed");
                    release_nodes(self.ctx.backend.as_ref(), &[previous.player]);
                }
                self.ctx
                    .fades
                    .ramp_to_preference(BusName::Ambient, self.ctx.timings.layer_fade());
                info!(path = %path, "Ambient bed playing");
                Readiness::Ready
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Ambient bed unavailable");
                Readiness::Degraded(e.to_string())
            }
        }
    }

    /// Prefer the time-of-day copy of `file`, else the shared one.
    async fn locate(&self, env: &SoundEnvironment, file: &str) -> String {
        let primary = time_of_day_path(env.time_of_day, file);
        if self.ctx.assets.exists(&primary).await {
            return primary;
        }
        let fallback = common_path(file);
        warn!(missing = %primary, fallback = %fallback, "Falling back to shared ambient bed");
        fallback
    }

    async fn start_player(&self, path: &str) -> Result<NodeId> {
        let buffer: DecodedBuffer = self.ctx.assets.load(path).await?;
        if !buffer.is_playable() {
            return Err(AeolusError::AssetDecode {
                path: path.to_string(),
                reason: "buffer has no duration".to_string(),
            });
        }

        let bus = self.ctx.bus(BusName::Ambient)?;
        let backend = &self.ctx.backend;
        let player = backend.create(NodeSpec::Player {
            buffer,
            looping: true,
            playback_rate: 1.0,
        })?;
        if let Err(e) = backend
            .connect(player, bus)
            .and_then(|_| backend.start(player, backend.now()))
        {
            release_nodes(backend.as_ref(), &[player]);
            return Err(e);
        }
        Ok(player)
    }
}

#[async_trait]
impl SceneLayer for AmbientLayer {
    fn name(&self) -> &'static str {
        "ambient"
    }

    async fn is_live(&self) -> bool {
        self.voice.lock().await.is_some()
    }

    async fn stop(&self, fade: Duration) {
        let Some(voice) = self.voice.lock().await.take() else {
            debug!("No ambient bed to stop");
            return;
        };
        self.ctx.fades.ramp_to_zero(BusName::Ambient, fade);
        wait_for(fade).await;
        release_nodes(self.ctx.backend.as_ref(), &[voice.player]);
        info!(path = %voice.path, "Ambient bed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::rig;
    use super::*;
    use crate::engine::{AssetLoader, AudioBackend, StaticAssetLoader};
    use crate::env::TimeOfDay;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    /// Loads take a second, so concurrent plays interleave.
    struct SlowAssets(StaticAssetLoader);

    #[async_trait]
    impl AssetLoader for SlowAssets {
        async fn exists(&self, path: &str) -> bool {
            self.0.exists(path).await
        }

        async fn load(&self, path: &str) -> Result<DecodedBuffer> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.0.load(path).await
        }
    }

    fn night_rain() -> SoundEnvironment {
        SoundEnvironment {
            condition: Some("Patchy rain possible".to_string()),
            time_of_day: TimeOfDay::Night,
            ..SoundEnvironment::default()
        }
    }

    fn single_bed_catalog(file: &str) -> AmbientCatalog {
        let mut catalog = AmbientCatalog::empty();
        catalog.insert(TimeOfDay::Night, "Light rain", [file.to_string()]);
        catalog
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_time_of_day_bed() {
        let assets =
            StaticAssetLoader::new().with("shared/timeOfDay/night/rain_on_leaves.wav", 60.0);
        let rig = rig(assets);
        let layer = AmbientLayer::new(rig.ctx.clone(), single_bed_catalog("rain_on_leaves.wav"));
        assert_eq!(layer.current_track(), AUTO_TRACK);

        let ready = layer.play_from_weather(&night_rain()).await;
        assert_eq!(ready, Readiness::Ready);
        assert_eq!(layer.current_track(), "Rain On Leaves");
        assert_eq!(
            layer.current_path().await.as_deref(),
            Some("shared/timeOfDay/night/rain_on_leaves.wav")
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        let bus = rig.ctx.bus(BusName::Ambient).unwrap();
        assert_relative_eq!(rig.backend.gain_value(bus).unwrap(), 0.5, epsilon = 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_common_path() {
        let assets = StaticAssetLoader::new().with("common/rain_on_leaves.wav", 60.0);
        let rig = rig(assets);
        let layer = AmbientLayer::new(rig.ctx.clone(), single_bed_catalog("rain_on_leaves.wav"));

        assert!(layer.play_from_weather(&night_rain()).await.is_ready());
        assert_eq!(
            layer.current_path().await.as_deref(),
            Some("common/rain_on_leaves.wav")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_length_buffer_is_degraded() {
        let assets = StaticAssetLoader::new().with("common/rain_on_leaves.wav", 0.0);
        let rig = rig(assets);
        let layer = AmbientLayer::new(rig.ctx.clone(), single_bed_catalog("rain_on_leaves.wav"));

        let ready = layer.play_from_weather(&night_rain()).await;
        assert!(matches!(ready, Readiness::Degraded(_)));
        assert!(!layer.is_live().await);
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_play_replaces_first() {
        let assets = StaticAssetLoader::new().with("common/rain_on_leaves.wav", 60.0);
        let rig = rig(assets);
        let layer = AmbientLayer::new(rig.ctx.clone(), single_bed_catalog("rain_on_leaves.wav"));

        layer.play_from_weather(&night_rain()).await;
        layer.play_from_weather(&night_rain()).await;
        assert_eq!(rig.layer_nodes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_plays_keep_one_bed() {
        let rig = rig(StaticAssetLoader::new());
        let mut ctx = rig.ctx.clone();
        ctx.assets = Arc::new(SlowAssets(
            StaticAssetLoader::new().with("common/rain_on_leaves.wav", 60.0),
        ));
        let layer = AmbientLayer::new(ctx, single_bed_catalog("rain_on_leaves.wav"));

        let (weather_a, weather_b) = (night_rain(), night_rain());
        let (first, second) = tokio::join!(
            layer.play_from_weather(&weather_a),
            layer.play_from_weather(&weather_b)
        );
        assert!(first.is_ready() && second.is_ready());
        assert_eq!(rig.layer_nodes(), 1);

        layer.stop(Duration::ZERO).await;
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_fade() {
        let assets = StaticAssetLoader::new().with("common/rain_on_leaves.wav", 60.0);
        let rig = rig(assets);
        let layer = AmbientLayer::new(rig.ctx.clone(), single_bed_catalog("rain_on_leaves.wav"));
        layer.play_from_weather(&night_rain()).await;

        let started = tokio::time::Instant::now();
        layer.stop(Duration::from_secs(10)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(rig.layer_nodes(), 0);

        let bus = rig.ctx.bus(BusName::Ambient).unwrap();
        assert_eq!(rig.backend.gain_value(bus).unwrap(), 0.0);

        layer.stop(Duration::from_secs(10)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
