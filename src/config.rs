//! Session configuration
//!
//! Loaded from an optional JSON file, then overridden from `AEOLUS_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) yields a working headless session.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AeolusError, Result};
use crate::weather::Coordinates;

const DEFAULT_WEATHER_URL: &str = "https://api.weatherapi.com/v1";

/// Wall-clock and transport timings used by the orchestrator and layers.
///
/// All values are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Interval between scene cycles.
    pub cycle_interval: f64,
    /// Full-scene fade before a new cycle tears down the previous one.
    pub scene_fade: f64,
    /// Pause after teardown before fetching weather.
    pub settle: f64,
    /// Per-layer fade-in/fade-out duration.
    pub layer_fade: f64,
    /// How long the drone and chimes sound per cycle.
    pub layer_lifetime: f64,
    /// The drone releases this long before its lifetime ends.
    pub drone_release_lead: f64,
    /// Gap between the drone envelope release and the bus fade.
    pub drone_release_gap: f64,
    /// Interval between chime bursts.
    pub chime_interval: f64,
    /// Safety timeout after which a chime voice is disposed.
    pub chime_voice_timeout: f64,
    /// Total band song length on the transport.
    pub band_duration: f64,
    /// The band fades out this long before it stops.
    pub band_fade_lead: f64,
    /// Transport clock tick.
    pub transport_tick: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            cycle_interval: 300.0,
            scene_fade: 5.0,
            settle: 0.5,
            layer_fade: 10.0,
            layer_lifetime: 300.0,
            drone_release_lead: 10.0,
            drone_release_gap: 2.0,
            chime_interval: 3.5,
            chime_voice_timeout: 10.0,
            band_duration: 300.0,
            band_fade_lead: 10.0,
            transport_tick: 0.025,
        }
    }
}

impl Timings {
    pub fn cycle_interval(&self) -> Duration {
        secs(self.cycle_interval)
    }

    pub fn scene_fade(&self) -> Duration {
        secs(self.scene_fade)
    }

    pub fn settle(&self) -> Duration {
        secs(self.settle)
    }

    pub fn layer_fade(&self) -> Duration {
        secs(self.layer_fade)
    }

    /// Time from drone start until its envelope release.
    pub fn drone_sounding(&self) -> Duration {
        secs(self.layer_lifetime - self.drone_release_lead)
    }

    pub fn drone_release_gap(&self) -> Duration {
        secs(self.drone_release_gap)
    }

    pub fn chime_session(&self) -> Duration {
        secs(self.layer_lifetime)
    }

    pub fn chime_interval(&self) -> Duration {
        secs(self.chime_interval)
    }

    pub fn chime_voice_timeout(&self) -> Duration {
        secs(self.chime_voice_timeout)
    }

    pub fn transport_tick(&self) -> Duration {
        secs(self.transport_tick)
    }

    /// Reject timings that would make timers fire immediately or never.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("cycle_interval", self.cycle_interval),
            ("layer_lifetime", self.layer_lifetime),
            ("chime_interval", self.chime_interval),
            ("chime_voice_timeout", self.chime_voice_timeout),
            ("band_duration", self.band_duration),
            ("transport_tick", self.transport_tick),
        ];
        for (name, value) in named {
            if !(value.is_finite() && value > 0.0) {
                return Err(AeolusError::InvalidConfig {
                    reason: format!("{} must be positive, got {}", name, value),
                });
            }
        }

        let non_negative = [
            ("scene_fade", self.scene_fade),
            ("settle", self.settle),
            ("layer_fade", self.layer_fade),
            ("drone_release_lead", self.drone_release_lead),
            ("drone_release_gap", self.drone_release_gap),
            ("band_fade_lead", self.band_fade_lead),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(AeolusError::InvalidConfig {
                    reason: format!("{} must not be negative, got {}", name, value),
                });
            }
        }

        if self.drone_release_lead > self.layer_lifetime {
            return Err(AeolusError::InvalidConfig {
                reason: "drone_release_lead exceeds layer_lifetime".to_string(),
            });
        }
        if self.band_fade_lead > self.band_duration {
            return Err(AeolusError::InvalidConfig {
                reason: "band_fade_lead exceeds band_duration".to_string(),
            });
        }
        Ok(())
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Top-level configuration for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AeolusConfig {
    /// Base URL of a WeatherAPI-compatible service.
    pub weather_url: String,
    /// API key for the weather service.
    pub weather_api_key: Option<String>,
    /// Coordinates used when no location override is given.
    pub location: Coordinates,
    /// Local directory or `http(s)://` base URL holding the audio assets.
    pub asset_root: String,
    /// File backing the volume preferences.
    pub preferences_path: PathBuf,
    /// Remote endpoint receiving telemetry posts.
    pub telemetry_url: Option<String>,
    pub timings: Timings,
}

impl Default for AeolusConfig {
    fn default() -> Self {
        Self {
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_api_key: None,
            location: Coordinates::new(51.5072, -0.1276),
            asset_root: "assets".to_string(),
            preferences_path: PathBuf::from("aeolus-volumes.json"),
            telemetry_url: None,
            timings: Timings::default(),
        }
    }
}

impl AeolusConfig {
    /// Load configuration from `path` (if given) and apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.timings.validate()?;
        Ok(config)
    }

    /// Override fields from `AEOLUS_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("AEOLUS_WEATHER_API_KEY") {
            self.weather_api_key = Some(key);
        }
        if let Ok(url) = env::var("AEOLUS_WEATHER_URL") {
            self.weather_url = url;
        }
        if let Ok(url) = env::var("AEOLUS_TELEMETRY_URL") {
            self.telemetry_url = Some(url);
        }
        if let Ok(root) = env::var("AEOLUS_ASSET_ROOT") {
            self.asset_root = root;
        }
    }

    /// Whether assets are fetched over HTTP rather than from disk.
    pub fn remote_assets(&self) -> bool {
        self.asset_root.starts_with("http://") || self.asset_root.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_timings_match_cycle_constants() {
        let timings = Timings::default();
        assert_eq!(timings.cycle_interval(), Duration::from_secs(300));
        assert_eq!(timings.drone_sounding(), Duration::from_secs(290));
        assert_eq!(timings.chime_interval(), Duration::from_millis(3500));
        assert!(timings.validate().is_ok());
    }

    #[test]
    fn test_invalid_timings_rejected() {
        let timings = Timings {
            chime_interval: 0.0,
            ..Timings::default()
        };
        let err = timings.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "asset_root": "/srv/sounds", "timings": {{ "scene_fade": 1.0 }} }}"#)
            .unwrap();

        let config = AeolusConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.asset_root, "/srv/sounds");
        assert_eq!(config.timings.scene_fade, 1.0);
        assert_eq!(config.timings.layer_fade, 10.0);
        assert!(!config.remote_assets());
    }
}
