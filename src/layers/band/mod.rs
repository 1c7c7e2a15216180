//! Band layer
//!
//! Turns a music profile into a song on the shared transport: chords on
//! keys and strings, a wind lead and metallic accent on each chorus, a
//! looped drum bar and a bass figure per section. Starting the band also
//! starts the drone, the chimes and the noise bed; stopping it releases
//! all of them.
//!
//! Notes are stamped with the transport time of their event mapped onto
//! the audio clock, never with the time the callback happens to run, so a
//! late clock tick delays nothing but the callback itself.

pub mod arrangement;
pub mod instruments;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chimes::{ChimeConditions, ChimeLayer};
use super::drone::DroneLayer;
use super::{wait_for, LayerContext, Readiness, SceneLayer};
use crate::engine::pitch::expand_chord;
use crate::engine::{lock, AudioBackend, ChordSymbol, EventId, NodeId, Pitch, Transport};
use crate::env::{generate_music_profile, MusicProfile, SoundEnvironment};
use crate::error::Result;
use crate::mixer::{BusName, FadeController};

use arrangement::{
    apply_density, arrange, bass_figure, bass_note, beat_pattern, section_chord, wind_note,
};
pub use arrangement::{DrumStep, SectionKind, SectionSpan, SONG_FORM};
pub use instruments::BandInstruments;

/// Buses faded in when the band starts. Drone and ambient manage their own.
pub const BAND_BUSES: [BusName; 7] = [
    BusName::Drums,
    BusName::Noise,
    BusName::Chimes,
    BusName::Piano,
    BusName::Bass,
    BusName::Strings,
    BusName::Winds,
];

const KEYS_OCTAVE: i32 = 3;
const STRINGS_OCTAVE: i32 = 3;
const BASS_OCTAVE: i32 = 1;
const WIND_DELAY: f64 = 0.5;
const METAL_DELAY: f64 = 1.0;
const METAL_NOTE: &str = "G6";

struct Song {
    instruments: BandInstruments,
    profile: MusicProfile,
    events: Vec<EventId>,
    clock: JoinHandle<()>,
}

pub struct BandLayer {
    ctx: LayerContext,
    drone: Arc<DroneLayer>,
    chimes: Arc<ChimeLayer>,
    rng: Mutex<StdRng>,
    song: tokio::sync::Mutex<Option<Song>>,
    me: Weak<BandLayer>,
}

impl BandLayer {
    pub fn new(ctx: LayerContext, drone: Arc<DroneLayer>, chimes: Arc<ChimeLayer>) -> Arc<Self> {
        let rng = Mutex::new(ctx.rng(4));
        Arc::new_cyclic(|me| Self {
            ctx,
            drone,
            chimes,
            rng,
            song: tokio::sync::Mutex::new(None),
            me: me.clone(),
        })
    }

    /// Profile of the song currently scheduled.
    pub async fn profile(&self) -> Option<MusicProfile> {
        self.song.lock().await.as_ref().map(|s| s.profile.clone())
    }

    /// Instrument handles of the song currently scheduled.
    pub async fn instruments(&self) -> Option<BandInstruments> {
        self.song.lock().await.as_ref().map(|s| s.instruments)
    }

    /// Ready once every bus the band plays into exists.
    pub async fn preload(&self) -> Readiness {
        let missing: Vec<String> = BAND_BUSES
            .iter()
            .filter(|bus| self.ctx.bus(**bus).is_err())
            .map(|bus| bus.to_string())
            .collect();
        if missing.is_empty() {
            Readiness::Ready
        } else {
            warn!(?missing, "Band buses not ready");
            Readiness::Degraded(format!("buses not ready: {}", missing.join(", ")))
        }
    }

    /// Derive a profile from `env`, schedule the song and start the
    /// transport, drone, chimes and noise bed
    ///
    /// Replaces any song already playing. Returns the profile used.
    pub async fn start(&self, env: &SoundEnvironment) -> Result<MusicProfile> {
        self.stop(Duration::ZERO).await;

        let profile = generate_music_profile(env);
        let transport = &self.ctx.transport;
        transport.stop();
        transport.cancel_all();
        transport.set_bpm(profile.bpm as f64);
        // Position `p` sounds at audio time `anchor + p` once started.
        let anchor = self.ctx.backend.now() - transport.position();

        let instruments = BandInstruments::create(&self.ctx, profile.noise_type)?;
        let events = match self.schedule_song(&profile, &instruments, anchor) {
            Ok(events) => events,
            Err(e) => {
                transport.cancel_all();
                instruments.release(self.ctx.backend.as_ref());
                return Err(e);
            }
        };

        transport.start();
        let clock = transport.spawn_clock(self.ctx.timings.transport_tick());
        *self.song.lock().await = Some(Song {
            instruments,
            profile: profile.clone(),
            events,
            clock,
        });

        if let Err(e) = self.drone.start(env).await {
            warn!(error = %e, "Drone skipped");
        }
        self.chimes
            .start(ChimeConditions::new(env.current(), profile.key.clone()))
            .await;

        let fade = self.ctx.timings.layer_fade();
        for bus in BAND_BUSES {
            self.ctx.fades.ramp_to_preference(bus, fade);
        }

        info!(
            bpm = profile.bpm,
            key = %profile.key,
            genre = %profile.genre,
            chords = ?profile.chords,
            "Band started"
        );
        Ok(profile)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    fn schedule_song(
        &self,
        profile: &MusicProfile,
        rack: &BandInstruments,
        anchor: f64,
    ) -> Result<Vec<EventId>> {
        let transport = &self.ctx.transport;
        let timings = &self.ctx.timings;
        let bar = transport.bars_to_seconds(1.0);
        let beat = transport.seconds_per_beat();
        let fade_at = (timings.band_duration - timings.band_fade_lead).max(0.0);
        let total_bars = (fade_at / bar).floor() as u32;
        let chords = profile
            .chords
            .iter()
            .map(|c| ChordSymbol::parse(c))
            .collect::<Result<Vec<_>>>()?;

        let mut events = Vec::new();
        for section in arrange(total_bars) {
            events.extend(self.schedule_section(profile, rack, &section, bar, anchor)?);
            events.extend(self.schedule_bass(&chords, rack, &section, bar, anchor)?);
        }
        events.push(self.schedule_drums(profile, rack, bar, beat, anchor));
        events.extend(self.schedule_ending(fade_at, timings.band_duration));

        debug!(events = events.len(), bars = total_bars, "Song scheduled");
        Ok(events)
    }

    fn schedule_section(
        &self,
        profile: &MusicProfile,
        rack: &BandInstruments,
        section: &SectionSpan,
        bar: f64,
        anchor: f64,
    ) -> Result<Vec<EventId>> {
        let Some(chord) = section_chord(&profile.chords, section) else {
            return Ok(Vec::new());
        };
        let transport = &self.ctx.transport;
        let start = section.start_bar as f64 * bar;
        let length = section.bars as f64 * bar;
        let label = format!("{} {}", section.kind, section.index);
        let mut events = Vec::new();

        let inversion = lock(&self.rng).random_range(0..3);
        let voicing = expand_chord(&chord, KEYS_OCTAVE, inversion)?;
        events.push(transport.schedule_once(
            start,
            &format!("{label} keys"),
            play(&self.ctx, rack.keys, voicing, length, anchor),
        ));

        if !section.is_chorus() {
            return Ok(events);
        }

        let symbol = ChordSymbol::parse(&chord)?;
        events.push(transport.schedule_once(
            start,
            &format!("{label} strings"),
            play(&self.ctx, rack.strings, symbol.triad(STRINGS_OCTAVE), length, anchor),
        ));

        let lead = {
            let mut rng = lock(&self.rng);
            let roll = rng.random::<f64>();
            let pick = rng.random_range(0..3);
            wind_note(&symbol, profile.melody_octave, roll, pick)
        };
        events.push(transport.schedule_once(
            start + WIND_DELAY,
            &format!("{label} wind"),
            play(&self.ctx, rack.wind, vec![lead], transport.note_value("2n")?, anchor),
        ));

        events.push(transport.schedule_once(
            start + METAL_DELAY,
            &format!("{label} metal"),
            play(
                &self.ctx,
                rack.metal,
                vec![Pitch::parse(METAL_NOTE)?],
                transport.note_value("4n")?,
                anchor,
            ),
        ));
        Ok(events)
    }

    fn schedule_drums(
        &self,
        profile: &MusicProfile,
        rack: &BandInstruments,
        bar: f64,
        beat: f64,
        anchor: f64,
    ) -> EventId {
        let pattern = apply_density(beat_pattern(profile.genre), profile.drum_density);
        let backend = Arc::clone(&self.ctx.backend);
        let rack = *rack;
        let hit = beat / 4.0;
        self.ctx
            .transport
            .schedule_repeat(0.0, bar, "drums", move |bar_at| {
                let downbeat = anchor + bar_at;
                for (i, step) in pattern.iter().enumerate() {
                    let at = downbeat + i as f64 * beat;
                    let voices = [
                        (step.kick, rack.kick),
                        (step.snare, rack.snare),
                        (step.hats, rack.hats),
                    ];
                    for (on, node) in voices {
                        if on {
                            trigger(backend.as_ref(), node, &[], hit, at);
                        }
                    }
                }
            })
    }

    /// Roll the section's bass figure and repeat it until the section
    /// ends, one transport event per pass.
    fn schedule_bass(
        &self,
        chords: &[ChordSymbol],
        rack: &BandInstruments,
        section: &SectionSpan,
        bar: f64,
        anchor: f64,
    ) -> Result<Vec<EventId>> {
        if chords.is_empty() {
            return Ok(Vec::new());
        }
        let transport = &self.ctx.transport;
        let (count, value) = bass_figure(section.kind);
        let step = transport.note_value(value)?;
        let figure: Vec<Pitch> = {
            let mut rng = lock(&self.rng);
            (0..count)
                .map(|i| bass_note(&chords[i % chords.len()], BASS_OCTAVE, rng.random::<f64>()))
                .collect()
        };

        let steps_per_bar = (bar / step).round() as usize;
        let total = section.bars as usize * steps_per_bar;
        let start = section.start_bar as f64 * bar;
        let label = format!("{} {} bass", section.kind, section.index);
        let mut events = Vec::new();
        for first in (0..total).step_by(count) {
            let notes = figure[..count.min(total - first)].to_vec();
            let backend = Arc::clone(&self.ctx.backend);
            let node = rack.bass;
            let pass = start + first as f64 * step;
            events.push(transport.schedule_once(pass, &label, move |at| {
                for (i, note) in notes.iter().enumerate() {
                    let when = anchor + at + i as f64 * step;
                    trigger(backend.as_ref(), node, &[*note], step, when);
                }
            }));
        }
        Ok(events)
    }

    /// Fade everything out ahead of the end, then stop the band.
    fn schedule_ending(&self, fade_at: f64, end: f64) -> [EventId; 2] {
        let transport = &self.ctx.transport;
        let fades: FadeController = self.ctx.fades.clone();
        let lead = Duration::from_secs_f64((end - fade_at).max(0.0));
        let fade = transport.schedule_once(fade_at, "fade out", move |_| {
            info!("Band ending, fading out");
            for bus in BusName::ALL {
                fades.ramp_to_zero(bus, lead);
            }
        });

        let me = self.me.clone();
        let stop = transport.schedule_once(end, "stop", move |_| {
            let Some(band) = me.upgrade() else { return };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { band.stop(Duration::ZERO).await });
                }
                Err(e) => warn!(error = %e, "No runtime to stop the band on"),
            }
        });
        [fade, stop]
    }
}

/// Callback that plays `pitches` on `node` for `length` seconds at the
/// audio time of the event.
fn play(
    ctx: &LayerContext,
    node: NodeId,
    pitches: Vec<Pitch>,
    length: f64,
    anchor: f64,
) -> impl FnMut(f64) + Send + 'static {
    let backend = Arc::clone(&ctx.backend);
    move |at| trigger(backend.as_ref(), node, &pitches, length, anchor + at)
}

fn trigger(
    backend: &dyn AudioBackend,
    node: NodeId,
    pitches: &[Pitch],
    length: f64,
    at: f64,
) {
    if let Err(e) = backend.trigger_attack_release(node, pitches, length, at) {
        debug!(node = %node, error = %e, "Note dropped");
    }
}

#[async_trait]
impl SceneLayer for BandLayer {
    fn name(&self) -> &'static str {
        "band"
    }

    async fn is_live(&self) -> bool {
        self.song.lock().await.is_some()
    }

    async fn stop(&self, fade: Duration) {
        let Some(song) = self.song.lock().await.take() else {
            debug!("No band to stop");
            return;
        };

        let transport: &Arc<Transport> = &self.ctx.transport;
        transport.stop();
        for id in &song.events {
            transport.cancel(*id);
        }
        song.clock.abort();

        for bus in BAND_BUSES {
            self.ctx.fades.ramp_to_zero(bus, fade);
        }
        wait_for(fade).await;

        self.drone.stop(Duration::ZERO).await;
        self.chimes.stop(Duration::ZERO).await;
        song.instruments.release(self.ctx.backend.as_ref());
        info!("Band stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NodeSpec, StaticAssetLoader, TriggerKind};
    use crate::env::{DrumDensity, Genre};
    use crate::layers::chimes::CHIME_FILES;
    use crate::layers::testing::{rig, Rig};
    use crate::weather::{Current, WeatherReport};
    use approx::assert_relative_eq;

    fn band(rig: &Rig) -> (Arc<BandLayer>, Arc<DroneLayer>, Arc<ChimeLayer>) {
        let drone = Arc::new(DroneLayer::new(rig.ctx.clone()));
        let chimes = Arc::new(ChimeLayer::new(rig.ctx.clone()));
        let band = BandLayer::new(rig.ctx.clone(), drone.clone(), chimes.clone());
        (band, drone, chimes)
    }

    fn chime_assets() -> StaticAssetLoader {
        CHIME_FILES
            .iter()
            .fold(StaticAssetLoader::new(), |loader, path| loader.with(path, 4.0))
    }

    /// Calm, partly cloudy summer day: 65 bpm, medium drums.
    fn calm_env() -> SoundEnvironment {
        SoundEnvironment {
            condition: Some("Partly cloudy".to_string()),
            weather: WeatherReport {
                current: Some(Current {
                    wind_kph: Some(5.0),
                    wind_dir: Some("N".to_string()),
                    gust_kph: Some(12.0),
                    uv: Some(4.0),
                    cloud: Some(40.0),
                    temp_c: Some(15.0),
                    humidity: Some(70.0),
                    ..Current::default()
                }),
                ..WeatherReport::default()
            },
            ..SoundEnvironment::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_schedules_song() {
        let rig = rig(chime_assets());
        let (band, drone, chimes) = band(&rig);
        chimes.preload().await;

        let profile = band.start(&calm_env()).await.unwrap();
        assert_eq!(profile.bpm, 65);
        assert_eq!(profile.drum_density, DrumDensity::Medium);
        assert_eq!(profile.genre, Genre::Hiphop);

        let transport = &rig.ctx.transport;
        assert!(transport.is_started());
        assert_eq!(transport.bpm(), 65.0);
        let labels: Vec<String> = transport.pending().into_iter().map(|(_, l, _)| l).collect();
        assert!(labels.iter().any(|l| l == "chorus 2 strings"));
        assert!(labels.iter().any(|l| l == "chorus 2 metal"));
        assert!(!labels.iter().any(|l| l == "verse 1 strings"));
        assert!(labels.iter().any(|l| l == "drums"));
        assert!(labels.iter().any(|l| l == "fade out"));

        assert!(drone.is_live().await);
        assert!(chimes.is_live().await);
        let rack = band.instruments().await.unwrap();
        assert!(rig.backend.is_started(rack.noise));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chorus_events_fire_on_transport_clock() {
        let rig = rig(chime_assets());
        let (band, _drone, _chimes) = band(&rig);
        band.start(&calm_env()).await.unwrap();
        let rack = band.instruments().await.unwrap();

        // First chorus starts at bar 12: 12 * 4 * 60 / 65 seconds.
        let chorus = 12.0 * 4.0 * 60.0 / 65.0;
        tokio::time::sleep(Duration::from_secs_f64(chorus - 0.5)).await;
        assert!(rig.backend.triggers_for(rack.strings).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.backend.triggers_for(rack.strings).len(), 1);
        let metal = rig.backend.triggers_for(rack.metal);
        assert_eq!(metal.len(), 1);
        assert_eq!(metal[0].pitches, vec![Pitch::parse("G6").unwrap()]);
        assert_eq!(rig.backend.triggers_for(rack.wind).len(), 1);

        let bass = rig.backend.triggers_for(rack.bass);
        assert!(bass.len() >= 12);
        assert!(bass
            .iter()
            .all(|t| matches!(t.kind, TriggerKind::AttackRelease { .. }) && t.pitches.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_medium_density_drum_hits() {
        let rig = rig(chime_assets());
        let (band, _drone, _chimes) = band(&rig);
        band.start(&calm_env()).await.unwrap();
        let rack = band.instruments().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Hip-hop bar: two kicks, one snare, two hats.
        assert_eq!(rig.backend.triggers_for(rack.kick).len(), 2);
        assert_eq!(rig.backend.triggers_for(rack.snare).len(), 1);
        assert_eq!(rig.backend.triggers_for(rack.hats).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_clock_keeps_bar_spacing() {
        let rig = rig(chime_assets());
        let (band, _drone, _chimes) = band(&rig);
        band.start(&calm_env()).await.unwrap();
        let rack = band.instruments().await.unwrap();
        let bar = 4.0 * 60.0 / 65.0;
        let eighth = bar / 8.0;

        // Three bars become due in one catch-up step.
        rig.ctx.transport.advance(10.0);

        let kicks: Vec<f64> = rig.backend.triggers_for(rack.kick).iter().map(|t| t.at).collect();
        assert_eq!(kicks.len(), 6);
        for pair in kicks.chunks(2).collect::<Vec<_>>().windows(2) {
            assert_relative_eq!(pair[1][0] - pair[0][0], bar, epsilon = 1e-9);
        }

        let bass: Vec<f64> = rig.backend.triggers_for(rack.bass).iter().map(|t| t.at).collect();
        assert_eq!(bass.len(), 24);
        for (i, at) in bass.iter().enumerate() {
            assert_relative_eq!(at - bass[0], i as f64 * eighth, epsilon = 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bass_figure_per_section() {
        let rig = rig(chime_assets());
        let (band, _drone, _chimes) = band(&rig);
        band.start(&calm_env()).await.unwrap();
        let rack = band.instruments().await.unwrap();
        let bar = 4.0 * 60.0 / 65.0;
        let beat = bar / 4.0;

        rig.ctx.transport.advance(40.0 * bar - 0.01);

        let bass = rig.backend.triggers_for(rack.bass);
        let anchor = bass[0].at;
        let form = arrange(40);
        let mut counts = vec![0usize; form.len()];
        for t in &bass {
            let bar_index = ((t.at - anchor) / bar + 1e-6).floor() as u32;
            let section = form
                .iter()
                .position(|s| bar_index >= s.start_bar && bar_index < s.start_bar + s.bars)
                .unwrap();
            counts[section] += 1;

            let want = match form[section].kind {
                SectionKind::Intro | SectionKind::Verse => beat / 2.0,
                SectionKind::Chorus => beat,
                SectionKind::Outro => beat * 2.0,
            };
            match t.kind {
                TriggerKind::AttackRelease { duration } => {
                    assert_relative_eq!(duration, want, epsilon = 1e-9)
                }
                ref other => panic!("unexpected trigger {:?}", other),
            }
            let octave = t.pitches[0].octave();
            assert!((1..=2).contains(&octave), "bass note in octave {}", octave);
        }
        // Intro, verse, chorus, verse, chorus, outro.
        assert_eq!(counts, vec![32, 64, 32, 64, 32, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_song_stops_itself() {
        let rig = rig(chime_assets());
        let (band, drone, chimes) = band(&rig);
        chimes.preload().await;
        band.start(&calm_env()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(295)).await;
        let piano = rig.ctx.bus(BusName::Piano).unwrap();
        assert!(rig.backend.gain_value(piano).unwrap() < 0.5);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!band.is_live().await);
        assert!(!drone.is_live().await);
        assert!(!chimes.is_live().await);
        assert!(!rig.ctx.transport.is_started());
        assert_eq!(rig.ctx.transport.pending_count(), 0);
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_one_song() {
        let rig = rig(chime_assets());
        let (band, _drone, chimes) = band(&rig);
        chimes.preload().await;

        band.start(&calm_env()).await.unwrap();
        let first = rig.ctx.transport.pending_count();
        band.start(&calm_env()).await.unwrap();
        assert_eq!(rig.ctx.transport.pending_count(), first);

        let instruments = rig
            .backend
            .live_nodes()
            .into_iter()
            .filter(|(_, spec)| matches!(spec, NodeSpec::Instrument { .. }))
            .count();
        assert_eq!(instruments, 8);

        band.stop(Duration::ZERO).await;
        band.stop(Duration::ZERO).await;
        assert_eq!(rig.layer_nodes(), 0);
    }
}
