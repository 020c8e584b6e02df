//! Current conditions lookup, read through the cache

pub mod open_meteo;

use std::time::Duration;

use crate::cache::CacheStore;
use crate::error::{Upstream, UpstreamError};
use crate::models::{Coordinates, WeatherSnapshot};

pub use open_meteo::OpenMeteoClient;

/// Fetches current weather for coordinates, consulting the cache first
#[derive(Debug, Clone)]
pub struct ConditionsLookup {
    client: OpenMeteoClient,
    ttl: Duration,
}

impl ConditionsLookup {
    #[must_use]
    pub fn new(client: OpenMeteoClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// Current weather at `coords`.
    ///
    /// Cached under the two-decimal bucket of the coordinates; a miss calls the
    /// upstream and writes the snapshot back (best effort).
    #[tracing::instrument(skip(self, cache), fields(lat = coords.latitude, lon = coords.longitude))]
    pub async fn fetch(
        &self,
        cache: &CacheStore,
        coords: &Coordinates,
    ) -> Result<WeatherSnapshot, UpstreamError> {
        let key = coords.cache_key();

        if let Some(cached) = cache.get::<WeatherSnapshot>(&key).await {
            return Ok(cached);
        }

        let response = self.client.current(coords).await?;
        let current = response.current.ok_or_else(|| {
            UpstreamError::invalid_response(Upstream::Weather, "missing 'current' block")
        })?;

        let snapshot = WeatherSnapshot {
            temperature: current.temperature,
            // Truncated like an integer cast, clamped to a valid percentage
            humidity: current.relative_humidity.clamp(0.0, 100.0) as u8,
            wind_speed: current.wind_speed,
            weather_code: current.weather_code as i32,
        };

        cache.set(&key, &snapshot, self.ttl).await;
        Ok(snapshot)
    }
}
