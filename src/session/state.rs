//! Per-session scene state
//!
//! Holds the derived sound environment between cycles, an optional manual
//! override, and the last coordinates that produced a complete report.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::env::{update_sound_environment, MusicProfile, SoundEnvironment};
use crate::error::Result;
use crate::weather::{Coordinates, WeatherReport};

/// Session state, owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    /// Unique session identifier
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Completed cycles
    pub cycles: u64,
    derived: SoundEnvironment,
    manual: Option<SoundEnvironment>,
    last_coords: Option<Coordinates>,
    profile: Option<MusicProfile>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            cycles: 0,
            derived: SoundEnvironment::default(),
            manual: None,
            last_coords: None,
            profile: None,
        }
    }

    /// The environment layers should follow: the manual override when one
    /// is set, otherwise the one derived from weather.
    pub fn environment(&self) -> &SoundEnvironment {
        self.manual.as_ref().unwrap_or(&self.derived)
    }

    pub fn derived_environment(&self) -> &SoundEnvironment {
        &self.derived
    }

    pub fn set_manual_environment(&mut self, env: SoundEnvironment) {
        self.manual = Some(env);
    }

    pub fn clear_manual_environment(&mut self) {
        self.manual = None;
    }

    pub fn has_manual_override(&self) -> bool {
        self.manual.is_some()
    }

    /// Derive the environment from `report`. An incomplete report leaves
    /// the state untouched.
    pub fn apply_report(&mut self, report: &WeatherReport, now: NaiveDateTime) -> Result<()> {
        update_sound_environment(&mut self.derived, report, now)
    }

    pub fn remember_coords(&mut self, coords: Coordinates) {
        self.last_coords = Some(coords);
    }

    /// Coordinates of the last complete report.
    pub fn last_coords(&self) -> Option<Coordinates> {
        self.last_coords
    }

    /// Store the profile the band is playing and copy its settings into
    /// the active environment.
    pub fn record_profile(&mut self, profile: &MusicProfile) {
        match self.manual.as_mut() {
            Some(manual) => manual.apply_profile(profile),
            None => self.derived.apply_profile(profile),
        }
        self.profile = Some(profile.clone());
    }

    pub fn profile(&self) -> Option<&MusicProfile> {
        self.profile.as_ref()
    }
}
