//! Open-Meteo HTTP client and wire formats
//!
//! Both the geocoding search and the forecast endpoint are plain `GET`s with
//! query parameters. No retries: a failed call is reported to the caller as is.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use crate::config::UpstreamConfig;
use crate::error::{Upstream, UpstreamError};
use crate::models::Coordinates;
use crate::telemetry::metrics;

/// Fields requested from the forecast endpoint's `current` block
pub const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code";

/// Geocoding search response
#[derive(Debug, Deserialize)]
pub struct GeocodingResponse {
    /// Absent when nothing matched
    pub results: Option<Vec<GeocodingResult>>,
}

/// A single geocoding match
#[derive(Debug, Deserialize)]
pub struct GeocodingResult {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub country: Option<String>,
}

/// Forecast response; only the `current` block is requested
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub current: Option<CurrentData>,
}

/// Current conditions as Open-Meteo names them
#[derive(Debug, Deserialize)]
pub struct CurrentData {
    #[serde(rename = "temperature_2m")]
    pub temperature: f64,
    #[serde(rename = "relative_humidity_2m")]
    pub relative_humidity: f64,
    #[serde(rename = "wind_speed_10m")]
    pub wind_speed: f64,
    pub weather_code: f64,
}

/// HTTP client for the two Open-Meteo endpoints
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    geocoding_url: String,
    weather_url: String,
}

impl OpenMeteoClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("weather-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            geocoding_url: config.geocoding_url.clone(),
            weather_url: config.weather_url.clone(),
        })
    }

    /// Search for a place by name, asking for a single result
    #[tracing::instrument(name = "geocoding_search", skip(self))]
    pub async fn search(&self, name: &str) -> Result<GeocodingResponse, UpstreamError> {
        self.get_json(
            Upstream::Geocoding,
            &self.geocoding_url,
            &[("name", name.to_string()), ("count", "1".to_string())],
        )
        .await
    }

    /// Current conditions at the given coordinates
    #[tracing::instrument(name = "weather_current", skip(self))]
    pub async fn current(&self, coords: &Coordinates) -> Result<ForecastResponse, UpstreamError> {
        self.get_json(
            Upstream::Weather,
            &self.weather_url,
            &[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ],
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: Upstream,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let started = Instant::now();

        let response = match self.client.get(url).query(query).send().await {
            Ok(response) => response,
            Err(err) => {
                metrics::record_external_request(service, "network_error", started.elapsed());
                tracing::warn!(api = service.label(), error = %err, "upstream request failed");
                return Err(UpstreamError::network(service, err.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            metrics::record_external_request(service, status.as_str(), started.elapsed());
            tracing::warn!(api = service.label(), status = status.as_u16(), "upstream returned error status");
            return Err(UpstreamError::status(service, status.as_u16()));
        }

        let parsed = response.json::<T>().await;
        metrics::record_external_request(service, status.as_str(), started.elapsed());
        tracing::debug!(
            api = service.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream request completed"
        );

        parsed.map_err(|err| {
            if err.is_decode() {
                UpstreamError::invalid_response(service, err.to_string())
            } else {
                UpstreamError::network(service, err.to_string())
            }
        })
    }
}
