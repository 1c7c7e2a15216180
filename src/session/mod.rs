//! Session Module
//!
//! Ties the layers to the weather:
//! - Scene orchestrator (cycle lifecycle, retry, shutdown)
//! - Session state (derived and manual environments)
//! - Status reporting

pub mod orchestrator;
pub mod state;
pub mod status;

pub use orchestrator::{CycleOutcome, SceneOrchestrator, SessionBuilder};
pub use state::SessionState;
pub use status::{
    status_line, LayerStatus, MemoryStatusSink, NowPlaying, StatusSink, TracingStatusSink,
    FETCH_FAILED_STATUS, INCOMPLETE_WEATHER_STATUS,
};
