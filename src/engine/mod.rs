//! Audio Engine Module
//!
//! Collaborator seams and shared clocks:
//! - Audio backend trait and the simulated backend
//! - Asset loading
//! - Pitch and chord helpers
//! - Shared musical transport

pub mod assets;
pub mod backend;
pub mod pitch;
pub mod simulated;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "http")]
pub use assets::HttpAssetLoader;
pub use assets::{AssetLoader, DecodedBuffer, FsAssetLoader, StaticAssetLoader};
pub use backend::{AudioBackend, InstrumentKind, NodeId, NodeSpec, Waveform};
pub use pitch::{ChordSymbol, Pitch};
pub use simulated::{SimulatedBackend, TriggerEvent, TriggerKind, TRIGGER_LOG_CAPACITY};
pub use transport::{EventId, Transport, TransportState};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
