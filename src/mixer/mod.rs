//! Mixer Module
//!
//! Gain staging shared by every layer:
//! - Bus registry (one gain node per layer)
//! - Fade controller (all gain ramps)
//! - Persisted volume preferences

pub mod bus;
pub mod fade;
pub mod preferences;

pub use bus::{BusName, GainBusRegistry, NOISE_BUS_START};
pub use fade::FadeController;
pub use preferences::{
    JsonFileStore, MemoryStore, PreferenceStore, VolumePreferences, DEFAULT_VOLUME,
};
