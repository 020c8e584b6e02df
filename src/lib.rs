//! `weather-api` - current weather for a city over HTTP
//!
//! Resolves a city name to coordinates, fetches current conditions for them
//! and returns a compact forecast. Both lookups read through a shared cache;
//! requests are authenticated (API key or bearer token) and rate limited.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod location_resolver;
pub mod models;
pub mod rate_limit;
pub mod telemetry;
pub mod weather;
pub mod web;

// Re-export core types for public API
pub use api::{AppState, router};
pub use auth::{AuthGate, AuthMode, Identity};
pub use cache::{CacheBackend, CacheStore};
pub use config::WeatherApiConfig;
pub use error::{ApiError, AuthError, ForecastError, UpstreamError};
pub use forecast::ForecastPipeline;
pub use location_resolver::CoordinateResolver;
pub use models::{Coordinates, ForecastResult, WeatherSnapshot};
pub use rate_limit::RateLimiter;
pub use weather::{ConditionsLookup, OpenMeteoClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
