//! Audio backend capability surface
//!
//! The scene engine never synthesizes audio itself. It builds and mutates a
//! node graph through [`AudioBackend`], addressing nodes by opaque
//! [`NodeId`] handles. Times passed to the backend are on the audio clock
//! returned by [`AudioBackend::now`], in seconds.

use std::fmt;

use serde::Serialize;

use super::assets::DecodedBuffer;
use super::pitch::Pitch;
use crate::env::NoiseType;
use crate::error::Result;

/// Handle to a node owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
            Waveform::Sawtooth => "sawtooth",
        };
        f.write_str(name)
    }
}

/// Synth voices used by the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Bass,
    Keys,
    Strings,
    Wind,
    Metal,
    Kick,
    Snare,
    Hats,
}

/// Construction parameters for a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeSpec {
    Gain {
        value: f64,
    },
    Compressor {
        threshold_db: f64,
        ratio: f64,
        attack: f64,
        release: f64,
    },
    Limiter {
        threshold_db: f64,
    },
    Oscillator {
        waveform: Waveform,
        frequency: f64,
        detune_cents: f64,
    },
    Envelope {
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
    },
    Lowpass {
        frequency: f64,
        q: f64,
    },
    Reverb {
        decay: f64,
        pre_delay: f64,
        wet: f64,
    },
    Player {
        buffer: DecodedBuffer,
        looping: bool,
        playback_rate: f64,
    },
    Panner {
        pan: f64,
    },
    Instrument {
        kind: InstrumentKind,
        polyphony: usize,
    },
    Noise {
        color: NoiseType,
    },
}

impl NodeSpec {
    /// Short type name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeSpec::Gain { .. } => "gain",
            NodeSpec::Compressor { .. } => "compressor",
            NodeSpec::Limiter { .. } => "limiter",
            NodeSpec::Oscillator { .. } => "oscillator",
            NodeSpec::Envelope { .. } => "envelope",
            NodeSpec::Lowpass { .. } => "lowpass",
            NodeSpec::Reverb { .. } => "reverb",
            NodeSpec::Player { .. } => "player",
            NodeSpec::Panner { .. } => "panner",
            NodeSpec::Instrument { .. } => "instrument",
            NodeSpec::Noise { .. } => "noise",
        }
    }

    /// Nodes that can be started and stopped.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            NodeSpec::Oscillator { .. } | NodeSpec::Player { .. } | NodeSpec::Noise { .. }
        )
    }

    /// Nodes that accept note triggers.
    pub fn is_triggerable(&self) -> bool {
        matches!(self, NodeSpec::Envelope { .. } | NodeSpec::Instrument { .. })
    }
}

/// The synthesis capabilities the scene engine relies on.
///
/// Every method takes `&self`: backends synchronize internally so layers can
/// share one backend behind an `Arc`.
pub trait AudioBackend: Send + Sync {
    /// Current audio clock time in seconds.
    fn now(&self) -> f64;

    /// Whether the audio context is running.
    fn is_running(&self) -> bool;

    /// Resume a suspended audio context.
    fn resume(&self) -> Result<()>;

    fn create(&self, spec: NodeSpec) -> Result<NodeId>;

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()>;

    /// Connect a node to the hardware output.
    fn connect_output(&self, node: NodeId) -> Result<()>;

    fn start(&self, node: NodeId, at: f64) -> Result<()>;

    fn stop(&self, node: NodeId, at: f64) -> Result<()>;

    /// Release a node. Disposing twice is an error.
    fn dispose(&self, node: NodeId) -> Result<()>;

    fn trigger_attack(&self, node: NodeId, pitches: &[Pitch], at: f64) -> Result<()>;

    fn trigger_release(&self, node: NodeId, at: f64) -> Result<()>;

    fn trigger_attack_release(
        &self,
        node: NodeId,
        pitches: &[Pitch],
        duration: f64,
        at: f64,
    ) -> Result<()>;

    fn set_playback_rate(&self, node: NodeId, rate: f64) -> Result<()>;

    /// Current value of a gain node, including any ramp in progress.
    fn gain_value(&self, node: NodeId) -> Result<f64>;

    /// Drop automation scheduled at or after `at`, holding the value there.
    fn cancel_scheduled_values(&self, node: NodeId, at: f64) -> Result<()>;

    fn set_value_at_time(&self, node: NodeId, value: f64, at: f64) -> Result<()>;

    /// Ramp linearly from the previous automation point to `value` at `at`.
    fn linear_ramp_to_value_at_time(&self, node: NodeId, value: f64, at: f64) -> Result<()>;
}
