//! Public forecast response

use serde::{Deserialize, Serialize};

use super::WeatherSnapshot;

/// Normalized forecast returned by `GET /forecast/{city}`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastResult {
    /// City exactly as the caller requested it
    pub city: String,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: u8,
    /// Wind speed in km/h
    pub wind_speed: f64,
    /// Human readable conditions, e.g. "Partly cloudy"
    pub conditions: String,
}

impl ForecastResult {
    #[must_use]
    pub fn new(city: impl Into<String>, weather: &WeatherSnapshot) -> Self {
        Self {
            city: city.into(),
            temperature: weather.temperature,
            humidity: weather.humidity,
            wind_speed: weather.wind_speed,
            conditions: weather.conditions().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_from_snapshot() {
        let weather = WeatherSnapshot {
            temperature: 15.5,
            humidity: 72,
            wind_speed: 12.3,
            weather_code: 2,
        };
        let forecast = ForecastResult::new(" London ", &weather);
        assert_eq!(forecast.city, " London ");
        assert_eq!(forecast.conditions, "Partly cloudy");
        assert_eq!(forecast.humidity, 72);
    }
}
