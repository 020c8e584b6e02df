//! Forecast pipeline
//!
//! Composes geocoding and the current-weather lookup: city -> coordinates ->
//! snapshot -> [`ForecastResult`]. Both stages read through the same
//! [`CacheStore`]; the pipeline owns it and lends it to each stage per call.

use anyhow::Result;
use tracing::info;

use crate::cache::CacheStore;
use crate::config::WeatherApiConfig;
use crate::error::ForecastError;
use crate::location_resolver::CoordinateResolver;
use crate::models::ForecastResult;
use crate::telemetry::metrics;
use crate::weather::{ConditionsLookup, OpenMeteoClient};

/// City name in, normalized forecast out
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    cache: CacheStore,
    resolver: CoordinateResolver,
    conditions: ConditionsLookup,
}

impl ForecastPipeline {
    #[must_use]
    pub fn new(cache: CacheStore, resolver: CoordinateResolver, conditions: ConditionsLookup) -> Self {
        Self {
            cache,
            resolver,
            conditions,
        }
    }

    /// Build both stages from configuration around an already connected cache
    pub fn from_config(config: &WeatherApiConfig, cache: CacheStore) -> Result<Self> {
        let client = OpenMeteoClient::new(&config.upstream)?;
        Ok(Self::new(
            cache,
            CoordinateResolver::new(client.clone(), config.cache.coordinates_ttl()),
            ConditionsLookup::new(client, config.cache.weather_ttl()),
        ))
    }

    /// Current forecast for `city`. The result echoes `city` unmodified.
    #[tracing::instrument(skip(self))]
    pub async fn get_forecast(&self, city: &str) -> Result<ForecastResult, ForecastError> {
        let outcome = self.run(city).await;

        let status = match &outcome {
            Ok(_) => "success",
            Err(ForecastError::CityNotFound(_)) => "not_found",
            Err(ForecastError::Upstream(_)) => "upstream_error",
        };
        metrics::record_forecast(city, status);

        outcome
    }

    async fn run(&self, city: &str) -> Result<ForecastResult, ForecastError> {
        let coords = self.resolver.resolve(&self.cache, city).await?;
        let weather = self.conditions.fetch(&self.cache, &coords).await?;

        let forecast = ForecastResult::new(city, &weather);
        info!(
            city,
            temperature = forecast.temperature,
            conditions = %forecast.conditions,
            "forecast ready"
        );
        Ok(forecast)
    }
}
