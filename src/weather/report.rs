//! Weather snapshot model
//!
//! Mirrors the subset of a WeatherAPI `forecast.json` response the scene
//! engine consumes. Every numeric field is optional: layers decide for
//! themselves whether a missing value is fatal for them.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AeolusError, Result};

/// A full weather/astro snapshot for one location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherReport {
    pub location: Option<Location>,
    pub current: Option<Current>,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub name: String,
    pub region: Option<String>,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    /// Local wall time at the location, `YYYY-MM-DD HH:MM`.
    pub localtime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub text: String,
    pub code: Option<u32>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Current {
    pub last_updated: Option<String>,
    pub condition: Condition,
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub is_day: Option<u8>,
    pub wind_kph: Option<f64>,
    pub wind_degree: Option<f64>,
    pub wind_dir: Option<String>,
    pub gust_kph: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub precip_mm: Option<f64>,
    pub humidity: Option<f64>,
    pub cloud: Option<f64>,
    pub vis_km: Option<f64>,
    pub uv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Forecast {
    pub forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastDay {
    pub date: Option<String>,
    pub astro: Astro,
}

/// Sun and moon times in the provider's `hh:mm AM/PM` format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Astro {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub moonrise: Option<String>,
    pub moonset: Option<String>,
    pub moon_phase: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub moon_illumination: Option<f64>,
}

/// Some providers send `moon_illumination` as a quoted number.
fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

impl WeatherReport {
    /// Today's astro block, if the forecast carried one.
    pub fn astro(&self) -> Option<&Astro> {
        self.forecast
            .as_ref()
            .and_then(|f| f.forecastday.first())
            .map(|day| &day.astro)
    }

    /// Both `current` and `location`, or the incomplete-data error that
    /// aborts a cycle.
    pub fn require_complete(&self) -> Result<(&Current, &Location)> {
        let current = self
            .current
            .as_ref()
            .ok_or(AeolusError::IncompleteWeather { missing: "current" })?;
        let location = self
            .location
            .as_ref()
            .ok_or(AeolusError::IncompleteWeather { missing: "location" })?;
        Ok((current, location))
    }

    /// Current condition text, empty when absent.
    pub fn condition_text(&self) -> &str {
        self.current
            .as_ref()
            .map(|c| c.condition.text.as_str())
            .unwrap_or("")
    }
}
