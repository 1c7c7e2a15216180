//! Status reporting
//!
//! A one-line status plus a flat now-playing record per cycle. Sinks are
//! optional; the orchestrator runs the same without one.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::engine::lock;
use crate::env::{Genre, Season, TimeOfDay};
use crate::weather::{Astro, Current, Location, WeatherReport};

/// Status shown when the provider omitted `current` or `location`.
pub const INCOMPLETE_WEATHER_STATUS: &str = "Incomplete weather data.";

/// Status shown when weather or location could not be fetched.
pub const FETCH_FAILED_STATUS: &str = "Failed to get weather/location.";

/// `"<location> | <condition> | <temp>°C | <wind> kph wind"`.
///
/// # Example
/// ```
/// use aeolus::session::status_line;
/// use aeolus::weather::{Condition, Current, Location};
///
/// let location = Location { name: "Bristol".into(), ..Location::default() };
/// let current = Current {
///     condition: Condition { text: "Light rain".into(), ..Condition::default() },
///     temp_c: Some(11.5),
///     wind_kph: Some(14.0),
///     ..Current::default()
/// };
/// assert_eq!(status_line(&location, &current), "Bristol | Light rain | 11.5°C | 14 kph wind");
/// ```
pub fn status_line(location: &Location, current: &Current) -> String {
    let reading = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
    format!(
        "{} | {} | {}°C | {} kph wind",
        location.name,
        current.condition.text,
        reading(current.temp_c),
        reading(current.wind_kph),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayerStatus {
    On,
    Off,
}

impl From<bool> for LayerStatus {
    fn from(live: bool) -> Self {
        if live {
            LayerStatus::On
        } else {
            LayerStatus::Off
        }
    }
}

/// What the scene is playing after a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub time: String,
    pub date: String,
    pub condition: String,
    pub biome: String,
    pub season: Season,
    pub time_of_day: TimeOfDay,
    pub ambient_track: String,
    pub drone_status: LayerStatus,
    pub chime_status: LayerStatus,
    pub weather: WeatherReport,
    pub astro: Option<Astro>,
    pub bpm: u32,
    pub key: String,
    pub genre: Genre,
}

/// Receiver of status updates.
pub trait StatusSink: Send + Sync {
    fn status(&self, line: &str);

    fn now_playing(&self, record: &NowPlaying);
}

/// Logs status through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn status(&self, line: &str) {
        info!(status = line, "Status");
    }

    fn now_playing(&self, record: &NowPlaying) {
        info!(
            track = %record.ambient_track,
            time_of_day = %record.time_of_day,
            season = %record.season,
            bpm = record.bpm,
            key = %record.key,
            genre = %record.genre,
            drone = ?record.drone_status,
            chimes = ?record.chime_status,
            "Now playing"
        );
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    lines: Mutex<Vec<String>>,
    records: Mutex<Vec<NowPlaying>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn last_line(&self) -> Option<String> {
        lock(&self.lines).last().cloned()
    }

    pub fn records(&self) -> Vec<NowPlaying> {
        lock(&self.records).clone()
    }
}

impl StatusSink for MemoryStatusSink {
    fn status(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }

    fn now_playing(&self, record: &NowPlaying) {
        lock(&self.records).push(record.clone());
    }
}
