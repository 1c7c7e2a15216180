//! Weather and location providers
//!
//! The orchestrator only sees the two traits. `WeatherApiClient` talks to a
//! WeatherAPI-compatible service; `StaticWeather` replays a fixed report for
//! offline runs and tests.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{Coordinates, WeatherReport};
use crate::engine::lock;
use crate::error::{AeolusError, Result};

/// Fetches a weather/astro snapshot for a pair of coordinates.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(&self, coords: Coordinates) -> Result<WeatherReport>;
}

/// Resolves the coordinates a cycle should fetch weather for.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn locate(&self) -> Result<Coordinates>;
}

/// A location fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    coords: Coordinates,
}

impl FixedLocation {
    pub fn new(coords: Coordinates) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<Coordinates> {
        Ok(self.coords)
    }
}

/// Replays a queue of canned reports, repeating the last one forever.
///
/// Each fetch also records the coordinates it was asked for so callers can
/// check which location a retry used.
#[derive(Debug)]
pub struct StaticWeather {
    reports: Mutex<Vec<Result<WeatherReport>>>,
    requests: Mutex<Vec<Coordinates>>,
}

impl StaticWeather {
    pub fn new(report: WeatherReport) -> Self {
        Self::sequence(vec![Ok(report)])
    }

    /// Serve `reports` in order; the final entry is served repeatedly.
    pub fn sequence(reports: Vec<Result<WeatherReport>>) -> Self {
        Self {
            reports: Mutex::new(reports),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Load a report from a JSON file in the provider's response format.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let report: WeatherReport = serde_json::from_str(&content)?;
        Ok(Self::new(report))
    }

    /// Coordinates of every fetch so far.
    pub fn requests(&self) -> Vec<Coordinates> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn fetch(&self, coords: Coordinates) -> Result<WeatherReport> {
        lock(&self.requests).push(coords);

        let mut reports = lock(&self.reports);
        let next = if reports.len() > 1 {
            reports.remove(0)
        } else {
            match reports.first() {
                Some(Ok(report)) => Ok(report.clone()),
                Some(Err(e)) => Err(AeolusError::WeatherFetch {
                    reason: e.to_string(),
                }),
                None => Err(AeolusError::WeatherFetch {
                    reason: "no report configured".to_string(),
                }),
            }
        };
        debug!(lat = coords.lat, lon = coords.lon, ok = next.is_ok(), "Static weather served");
        next
    }
}

/// Client for a WeatherAPI-compatible `forecast.json` endpoint.
#[cfg(feature = "http")]
pub struct WeatherApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[cfg(feature = "http")]
impl WeatherApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn forecast_url(&self) -> String {
        format!("{}/forecast.json", self.base_url)
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl WeatherProvider for WeatherApiClient {
    async fn fetch(&self, coords: Coordinates) -> Result<WeatherReport> {
        let query = coords.to_string();
        debug!(url = %self.forecast_url(), q = %query, "Fetching weather");

        let response = self
            .client
            .get(self.forecast_url())
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query.as_str()),
                ("days", "1"),
                ("aqi", "no"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AeolusError::WeatherFetch {
                reason: format!("weather API returned {}", response.status()),
            });
        }

        Ok(response.json::<WeatherReport>().await?)
    }
}
