//! Weather Module
//!
//! External weather collaborators:
//! - Snapshot model matching the provider's response
//! - Weather and location providers
//! - Telemetry posting

pub mod providers;
pub mod report;
pub mod telemetry;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use providers::{FixedLocation, LocationProvider, StaticWeather, WeatherProvider};
#[cfg(feature = "http")]
pub use providers::WeatherApiClient;
pub use report::{Astro, Condition, Current, Forecast, ForecastDay, Location, WeatherReport};
#[cfg(feature = "http")]
pub use telemetry::HttpTelemetry;
pub use telemetry::{calculate_energy_level, NullTelemetry, TelemetryRecord, TelemetrySink};

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}
