//! Drone layer
//!
//! Two slightly detuned oscillators through one envelope, a lowpass and a
//! reverb. Wind picks the waveform and pitch, UV opens the filter, cloud
//! cover sets the reverb mix. Each voice lives for a fixed time and then
//! releases itself unless stopped first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{release_nodes, wait_for, LayerContext, SceneLayer};
use crate::engine::pitch::{transpose_frequency, A2_HZ};
use crate::engine::{AudioBackend, NodeId, NodeSpec, Waveform};
use crate::env::SoundEnvironment;
use crate::error::{AeolusError, Result};
use crate::mixer::BusName;
use crate::weather::Current;

/// Detune of the second oscillator.
pub const DETUNE_CENTS: f64 = 5.0;

const MIN_FREQUENCY: f64 = 20.0;

/// Waveform for a compass wind direction such as `NNE`.
pub fn waveform_for(wind_dir: Option<&str>) -> Waveform {
    let dir = wind_dir.map(|d| d.trim().to_ascii_uppercase());
    match dir.as_deref() {
        Some("ENE" | "E" | "ESE" | "SE") => Waveform::Square,
        Some("SSE" | "S" | "SSW" | "SW") => Waveform::Triangle,
        Some("WSW" | "W" | "WNW" | "NW") => Waveform::Sawtooth,
        _ => Waveform::Sine,
    }
}

/// Synthesis parameters derived from one weather reading.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneParams {
    pub waveform: Waveform,
    pub frequency: f64,
    pub cutoff: f64,
    pub q: f64,
    pub wet: f64,
}

impl DroneParams {
    /// Fails when UV or cloud cover is missing.
    pub fn from_weather(current: &Current) -> Result<Self> {
        let uv = current
            .uv
            .ok_or(AeolusError::MissingWeatherField { field: "uv" })?;
        let cloud = current
            .cloud
            .ok_or(AeolusError::MissingWeatherField { field: "cloud" })?;
        let wind = current.wind_kph.unwrap_or(0.0);

        Ok(Self {
            waveform: waveform_for(current.wind_dir.as_deref()),
            frequency: transpose_frequency(A2_HZ, wind / 3.0).max(MIN_FREQUENCY),
            cutoff: 100.0 + uv * 100.0,
            q: if uv > 5.0 { 10.0 } else { 2.0 },
            wet: (cloud / 100.0).clamp(0.0, 1.0),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct DroneNodes {
    oscillators: [NodeId; 2],
    envelope: NodeId,
    filter: NodeId,
    reverb: NodeId,
}

impl DroneNodes {
    fn all(&self) -> [NodeId; 5] {
        [
            self.oscillators[0],
            self.oscillators[1],
            self.envelope,
            self.filter,
            self.reverb,
        ]
    }
}

struct DroneVoice {
    id: u64,
    nodes: DroneNodes,
    params: DroneParams,
    lifetime: JoinHandle<()>,
}

pub struct DroneLayer {
    ctx: LayerContext,
    voice: Arc<Mutex<Option<DroneVoice>>>,
    next_voice: AtomicU64,
}

impl DroneLayer {
    pub fn new(ctx: LayerContext) -> Self {
        Self {
            ctx,
            voice: Arc::new(Mutex::new(None)),
            next_voice: AtomicU64::new(0),
        }
    }

    /// Parameters of the sounding voice.
    pub async fn params(&self) -> Option<DroneParams> {
        self.voice.lock().await.as_ref().map(|v| v.params.clone())
    }

    /// Start a voice for the environment's weather, replacing any voice
    /// already sounding.
    pub async fn start(&self, env: &SoundEnvironment) -> Result<()> {
        let current = env
            .current()
            .ok_or(AeolusError::IncompleteWeather { missing: "current" })?;
        let params = DroneParams::from_weather(current)?;

        self.stop(Duration::ZERO).await;

        let bus = self.ctx.bus(BusName::Drone)?;
        let nodes = build_voice(self.ctx.backend.as_ref(), &params, bus)?;

        let id = self.next_voice.fetch_add(1, Ordering::SeqCst);
        let lifetime = tokio::spawn(run_lifetime(
            self.ctx.clone(),
            Arc::clone(&self.voice),
            id,
            nodes,
        ));
        *self.voice.lock().await = Some(DroneVoice {
            id,
            nodes,
            params: params.clone(),
            lifetime,
        });

        self.ctx
            .fades
            .ramp_to_preference(BusName::Drone, self.ctx.timings.layer_fade());
        info!(
            waveform = %params.waveform,
            frequency = params.frequency,
            cutoff = params.cutoff,
            wet = params.wet,
            "Drone started"
        );
        Ok(())
    }
}

fn build_voice(backend: &dyn AudioBackend, params: &DroneParams, bus: NodeId) -> Result<DroneNodes> {
    let mut created = Vec::with_capacity(5);
    let result = wire_voice(backend, params, bus, &mut created);
    if result.is_err() {
        release_nodes(backend, &created);
    }
    result
}

fn wire_voice(
    backend: &dyn AudioBackend,
    params: &DroneParams,
    bus: NodeId,
    created: &mut Vec<NodeId>,
) -> Result<DroneNodes> {
    let mut make = |spec: NodeSpec| -> Result<NodeId> {
        let node = backend.create(spec)?;
        created.push(node);
        Ok(node)
    };
    let osc1 = make(NodeSpec::Oscillator {
        waveform: params.waveform,
        frequency: params.frequency,
        detune_cents: 0.0,
    })?;
    let osc2 = make(NodeSpec::Oscillator {
        waveform: params.waveform,
        frequency: params.frequency,
        detune_cents: DETUNE_CENTS,
    })?;
    let envelope = make(NodeSpec::Envelope {
        attack: 2.0,
        decay: 1.5,
        sustain: 0.8,
        release: 5.0,
    })?;
    let filter = make(NodeSpec::Lowpass {
        frequency: params.cutoff,
        q: params.q,
    })?;
    let reverb = make(NodeSpec::Reverb {
        decay: 6.0,
        pre_delay: 0.01,
        wet: params.wet,
    })?;

    backend.connect(osc1, envelope)?;
    backend.connect(osc2, envelope)?;
    backend.connect(envelope, filter)?;
    backend.connect(filter, reverb)?;
    backend.connect(reverb, bus)?;

    let now = backend.now();
    backend.start(osc1, now)?;
    backend.start(osc2, now)?;
    backend.trigger_attack(envelope, &[], now)?;

    Ok(DroneNodes {
        oscillators: [osc1, osc2],
        envelope,
        filter,
        reverb,
    })
}

/// Sound, release, fade and tear down one voice unless it was replaced.
async fn run_lifetime(
    ctx: LayerContext,
    slot: Arc<Mutex<Option<DroneVoice>>>,
    id: u64,
    nodes: DroneNodes,
) {
    let timings = &ctx.timings;
    tokio::time::sleep(timings.drone_sounding()).await;

    let backend = ctx.backend.as_ref();
    if let Err(e) = backend.trigger_release(nodes.envelope, backend.now()) {
        debug!(error = %e, "Drone release skipped");
    }
    tokio::time::sleep(timings.drone_release_gap()).await;

    ctx.fades.ramp_to_zero(BusName::Drone, timings.layer_fade());
    tokio::time::sleep(timings.layer_fade()).await;

    let mut slot = slot.lock().await;
    if slot.as_ref().map(|v| v.id) == Some(id) {
        slot.take();
        release_nodes(backend, &nodes.all());
        info!("Drone finished");
    }
}

#[async_trait]
impl SceneLayer for DroneLayer {
    fn name(&self) -> &'static str {
        "drone"
    }

    async fn is_live(&self) -> bool {
        self.voice.lock().await.is_some()
    }

    async fn stop(&self, fade: Duration) {
        let Some(voice) = self.voice.lock().await.take() else {
            debug!("No drone to stop");
            return;
        };
        voice.lifetime.abort();

        let backend = self.ctx.backend.as_ref();
        if let Err(e) = backend.trigger_release(voice.nodes.envelope, backend.now()) {
            debug!(error = %e, "Drone release skipped");
        }
        self.ctx.fades.ramp_to_zero(BusName::Drone, fade);
        wait_for(fade).await;
        release_nodes(backend, &voice.nodes.all());
        info!("Drone stopped");
    }
}

impl Drop for DroneLayer {
    fn drop(&mut self) {
        if let Ok(slot) = self.voice.try_lock() {
            if let Some(voice) = slot.as_ref() {
                warn!("Drone layer dropped while sounding");
                voice.lifetime.abort();
            }
        }
    }
}
