//! Location model for geographic coordinates and cache keys

use serde::{Deserialize, Serialize};

/// Geographic coordinates in decimal degrees
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// Cache key for the weather at these coordinates.
    ///
    /// Coordinates are bucketed to two decimals, so nearby points share an entry.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("weather:{:.2}:{:.2}", self.latitude, self.longitude)
    }
}

/// Cache key for a city's coordinates, insensitive to case and surrounding whitespace
#[must_use]
pub fn coordinates_cache_key(city: &str) -> String {
    format!("coords:{}", city.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("London")]
    #[case("london")]
    #[case(" London ")]
    #[case("LONDON\t")]
    fn test_coordinates_key_normalizes_city(#[case] city: &str) {
        assert_eq!(coordinates_cache_key(city), "coords:london");
    }

    #[test]
    fn test_coordinates_key_keeps_inner_whitespace() {
        assert_eq!(coordinates_cache_key(" New York "), "coords:new york");
    }

    #[test]
    fn test_weather_cache_key() {
        let location = Coordinates::new(51.5074, -0.1278);
        assert_eq!(location.cache_key(), "weather:51.51:-0.13");
    }

    #[test]
    fn test_nearby_coordinates_share_weather_key() {
        let a = Coordinates::new(46.818_234, 8.227_456);
        let b = Coordinates::new(46.821, 8.2299);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "weather:46.82:8.23");

        let far = Coordinates::new(46.83, 8.23);
        assert_ne!(a.cache_key(), far.cache_key());
    }
}
