//! City name to coordinates, read through the cache

use std::time::Duration;

use tracing::debug;

use crate::cache::CacheStore;
use crate::error::ForecastError;
use crate::models::{Coordinates, coordinates_cache_key};
use crate::weather::OpenMeteoClient;

/// Resolves city names via the geocoding upstream
#[derive(Debug, Clone)]
pub struct CoordinateResolver {
    client: OpenMeteoClient,
    ttl: Duration,
}

impl CoordinateResolver {
    #[must_use]
    pub fn new(client: OpenMeteoClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// Resolve a city to coordinates.
    ///
    /// The cache key ignores case and surrounding whitespace, but the upstream
    /// is queried with `city` exactly as given.
    #[tracing::instrument(skip(self, cache))]
    pub async fn resolve(&self, cache: &CacheStore, city: &str) -> Result<Coordinates, ForecastError> {
        let key = coordinates_cache_key(city);

        if let Some(cached) = cache.get::<Coordinates>(&key).await {
            debug!("Using cached coordinates for '{}'", city);
            return Ok(cached);
        }

        let response = self.client.search(city).await?;
        let Some(first) = response.results.unwrap_or_default().into_iter().next() else {
            return Err(ForecastError::CityNotFound(city.to_string()));
        };

        let coords = Coordinates::new(first.latitude, first.longitude);
        debug!(
            "Found location: {}, {} ({})",
            first.name.as_deref().unwrap_or(city),
            first.country.as_deref().unwrap_or("unknown country"),
            coords.format_coordinates()
        );

        cache.set(&key, &coords, self.ttl).await;
        Ok(coords)
    }
}
