//! Telemetry posting
//!
//! Each cycle posts a flat record of the weather it played to a remote
//! collector. Posting is fire-and-forget: failures are logged by the caller
//! and never affect playback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Coordinates, WeatherReport};
use crate::env::Energy;
use crate::error::{AeolusError, Result};

/// Classify how energetic the weather feels.
///
/// Warm dry air is `Low`, humid or heavily clouded air is `High`. Missing
/// readings count as 0, matching how the collector has always scored them.
pub fn calculate_energy_level(
    temp_c: Option<f64>,
    humidity: Option<f64>,
    cloud: Option<f64>,
) -> Energy {
    let temp = temp_c.unwrap_or(0.0);
    let humidity = humidity.unwrap_or(0.0);
    let cloud = cloud.unwrap_or(0.0);

    if temp > 18.0 && humidity < 65.0 {
        Energy::Low
    } else if humidity > 75.0 || cloud > 70.0 {
        Energy::High
    } else {
        Energy::Medium
    }
}

/// One row sent to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "formattedTimestamp")]
    pub formatted_timestamp: String,
    pub epoch: i64,
    pub last_updated: String,
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_deg: Option<f64>,
    pub wind_dir: Option<String>,
    pub gust_kph: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub precip_mm: Option<f64>,
    pub humidity: Option<f64>,
    pub cloud: Option<f64>,
    pub is_day: Option<u8>,
    pub uv: Option<f64>,
    #[serde(rename = "energyLevel")]
    pub energy_level: Energy,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
    #[serde(rename = "Condition_Text")]
    pub condition_text: String,
    #[serde(rename = "Condition_Code")]
    pub condition_code: Option<u32>,
    #[serde(rename = "Condition_Icon_URL")]
    pub condition_icon_url: String,
    #[serde(rename = "Sunrise")]
    pub sunrise: String,
    #[serde(rename = "Sunset")]
    pub sunset: String,
    #[serde(rename = "Moonrise")]
    pub moonrise: String,
    #[serde(rename = "Moonset")]
    pub moonset: String,
    #[serde(rename = "Moon Phase")]
    pub moon_phase: String,
    #[serde(rename = "Moon Illumination")]
    pub moon_illumination: Option<f64>,
    #[serde(rename = "NOTES")]
    pub notes: String,
}

impl TelemetryRecord {
    /// Flatten a complete report into a record.
    pub fn from_report(
        report: &WeatherReport,
        coords: Coordinates,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        let (current, location) = report.require_complete()?;
        let astro = report.astro().cloned().unwrap_or_default();
        let icon = current.condition.icon.clone().unwrap_or_default();

        Ok(Self {
            timestamp: at,
            formatted_timestamp: at.format("%d/%m/%Y, %H:%M").to_string(),
            epoch: at.timestamp(),
            last_updated: current.last_updated.clone().unwrap_or_default(),
            temp_c: current.temp_c,
            feelslike_c: current.feelslike_c,
            wind_kph: current.wind_kph,
            wind_deg: current.wind_degree,
            wind_dir: current.wind_dir.clone(),
            gust_kph: current.gust_kph,
            pressure_mb: current.pressure_mb,
            precip_mm: current.precip_mm,
            humidity: current.humidity,
            cloud: current.cloud,
            is_day: current.is_day,
            uv: current.uv,
            energy_level: calculate_energy_level(current.temp_c, current.humidity, current.cloud),
            location: location.name.clone(),
            lat: coords.lat,
            lon: coords.lon,
            condition_text: current.condition.text.clone(),
            condition_code: current.condition.code,
            condition_icon_url: if icon.is_empty() {
                String::new()
            } else {
                format!("https:{}", icon)
            },
            sunrise: astro.sunrise.unwrap_or_default(),
            sunset: astro.sunset.unwrap_or_default(),
            moonrise: astro.moonrise.unwrap_or_default(),
            moonset: astro.moonset.unwrap_or_default(),
            moon_phase: astro.moon_phase.unwrap_or_default(),
            moon_illumination: astro.moon_illumination,
            notes: String::new(),
        })
    }
}

/// Destination for per-cycle telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn post(&self, record: &TelemetryRecord) -> Result<()>;
}

/// Drops every record. Used when no collector is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

#[async_trait]
impl TelemetrySink for NullTelemetry {
    async fn post(&self, _record: &TelemetryRecord) -> Result<()> {
        Ok(())
    }
}

/// Posts records as JSON to a collector endpoint.
#[cfg(feature = "http")]
pub struct HttpTelemetry {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
impl HttpTelemetry {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl TelemetrySink for HttpTelemetry {
    async fn post(&self, record: &TelemetryRecord) -> Result<()> {
        let response = self.client.post(&self.url).json(record).send().await?;
        if !response.status().is_success() {
            return Err(AeolusError::Telemetry {
                reason: format!("collector returned {}", response.status()),
            });
        }
        tracing::debug!(url = %self.url, "Telemetry posted");
        Ok(())
    }
}
