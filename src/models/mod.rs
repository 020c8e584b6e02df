//! Data models for the weather API
//!
//! - Location: geographic coordinates and their cache keys
//! - Weather: current conditions as reported upstream
//! - Forecast: the normalized public response

pub mod forecast;
pub mod location;
pub mod weather;

pub use forecast::ForecastResult;
pub use location::{Coordinates, coordinates_cache_key};
pub use weather::{WeatherSnapshot, conditions_for_code};
