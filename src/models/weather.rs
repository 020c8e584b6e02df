//! Current weather snapshot and WMO weather code labels

use serde::{Deserialize, Serialize};

/// Current conditions at a point, as reported by the weather upstream
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherSnapshot {
    /// Temperature in Celsius
    pub temperature: f64,
    /// Relative humidity percentage (0-100)
    pub humidity: u8,
    /// Wind speed in km/h
    pub wind_speed: f64,
    /// WMO weather interpretation code
    pub weather_code: i32,
}

impl WeatherSnapshot {
    /// Human readable label for this snapshot's weather code
    #[must_use]
    pub fn conditions(&self) -> &'static str {
        conditions_for_code(self.weather_code)
    }
}

/// Convert a WMO weather code to a human readable label.
///
/// Total over all integers; codes outside the table map to `"Unknown"`.
#[must_use]
pub fn conditions_for_code(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "Clear sky")]
    #[case(2, "Partly cloudy")]
    #[case(45, "Foggy")]
    #[case(82, "Violent rain showers")]
    #[case(99, "Thunderstorm with heavy hail")]
    fn test_known_codes(#[case] code: i32, #[case] label: &str) {
        assert_eq!(conditions_for_code(code), label);
    }

    #[rstest]
    #[case(999)]
    #[case(-1)]
    #[case(56)]
    fn test_unknown_codes(#[case] code: i32) {
        assert_eq!(conditions_for_code(code), "Unknown");
    }
}
