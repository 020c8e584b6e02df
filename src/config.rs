//! Configuration management for the weather API
//!
//! Settings are read once at startup from an optional TOML file and
//! `WEATHER_API_*` environment variables, then validated. Nothing reloads them
//! afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitSpec;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherApiConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PEM certificate chain; TLS is used when both paths are set
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

/// Upstream geocoding and weather endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub geocoding_url: String,
    pub weather_url: String,
    /// Connect + read timeout for every upstream call
    pub timeout_seconds: u64,
}

/// Which backend stores cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Local,
}

/// Read-through cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// e.g. `redis://localhost:6379`; the redis backend is off without it
    pub redis_url: Option<String>,
    pub redis_password: Option<String>,
    /// Directory for the embedded store used by the `local` backend
    pub local_path: PathBuf,
    pub coordinates_ttl_seconds: u64,
    pub weather_ttl_seconds: u64,
    /// Upper bound on a single cache round trip
    pub operation_timeout_ms: u64,
}

/// Authentication schemes and their secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key_enabled: bool,
    pub api_keys: Vec<String>,
    pub jwt_enabled: bool,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expiration_minutes: u64,
    /// `username:bcrypt-hash` pairs allowed to log in
    pub users: Vec<String>,
}

/// What the rate limiter partitions quotas by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPartition {
    /// Authenticated identity, falling back to the client address
    Identity,
    /// Client network address only
    Address,
}

/// Per-route request quotas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Quota for routes without their own, e.g. `100/minute`
    pub default: String,
    pub forecast: String,
    pub partition: RateLimitPartition,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (pretty or json)
    pub format: String,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP/HTTP collector base URL, e.g. `http://otel-collector:4318`
    pub otlp_endpoint: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            weather_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Redis,
            redis_url: None,
            redis_password: None,
            local_path: PathBuf::from(".cache/weather-api"),
            coordinates_ttl_seconds: 30 * 24 * 60 * 60,
            weather_ttl_seconds: 15 * 60,
            operation_timeout_ms: 500,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_enabled: false,
            api_keys: Vec::new(),
            jwt_enabled: false,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_algorithm: "HS256".to_string(),
            jwt_expiration_minutes: 30,
            users: Vec::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: "100/minute".to_string(),
            forecast: "30/minute".to_string(),
            partition: RateLimitPartition::Identity,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "weather-api".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn coordinates_ttl(&self) -> Duration {
        Duration::from_secs(self.coordinates_ttl_seconds)
    }

    #[must_use]
    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_seconds)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl AuthConfig {
    /// Parse the `users` list into a username -> password hash table.
    ///
    /// Entries without a `:` are skipped; `validate` rejects them up front.
    #[must_use]
    pub fn user_table(&self) -> HashMap<String, String> {
        self.users
            .iter()
            .filter_map(|entry| entry.split_once(':'))
            .map(|(user, hash)| (user.trim().to_string(), hash.trim().to_string()))
            .filter(|(user, hash)| !user.is_empty() && !hash.is_empty())
            .collect()
    }

    /// Configured API keys with blanks removed
    pub fn api_key_set(&self) -> impl Iterator<Item = &str> {
        self.api_keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
    }
}

impl WeatherApiConfig {
    /// Load configuration from `config.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from the given file (if present) and the environment
    pub fn load_from_path(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.map_or_else(|| PathBuf::from("config.toml"), Path::to_path_buf);
        if config_path.is_some() && !config_file.exists() {
            bail!("Config file not found: {}", config_file.display());
        }

        builder = builder.add_source(
            File::from(config_file)
                .required(false)
                .format(config::FileFormat::Toml),
        );

        builder = builder.add_source(
            Environment::with_prefix("WEATHER_API")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("auth.api_keys")
                .with_list_parse_key("auth.users"),
        );

        let settings = builder
            .build()
            .context("Failed to build configuration")?;

        let config: WeatherApiConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_upstream()?;
        self.validate_cache()?;
        self.validate_auth()?;
        self.validate_rate_limits()?;
        self.validate_logging()?;
        Ok(())
    }

    fn validate_upstream(&self) -> Result<()> {
        for (name, url) in [
            ("geocoding", &self.upstream.geocoding_url),
            ("weather", &self.upstream.weather_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("Upstream {name} URL must be a valid HTTP or HTTPS URL");
            }
        }

        if self.upstream.timeout_seconds == 0 || self.upstream.timeout_seconds > 300 {
            bail!("Upstream timeout must be between 1 and 300 seconds");
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<()> {
        if self.cache.coordinates_ttl_seconds == 0 || self.cache.weather_ttl_seconds == 0 {
            bail!("Cache TTLs must be greater than zero");
        }
        if self.cache.operation_timeout_ms == 0 {
            bail!("Cache operation timeout must be greater than zero");
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<()> {
        let auth = &self.auth;

        if let Some(bad) = auth.users.iter().find(|entry| !entry.contains(':')) {
            bail!("Invalid user entry '{bad}'. Expected 'username:password-hash'");
        }

        if auth.jwt_enabled {
            if auth.jwt_secret.is_empty() {
                bail!("JWT secret cannot be empty when JWT authentication is enabled");
            }
            if auth.jwt_expiration_minutes == 0 {
                bail!("JWT expiration must be greater than zero");
            }
        }

        let valid_algorithms = ["HS256", "HS384", "HS512"];
        if !valid_algorithms.contains(&auth.jwt_algorithm.as_str()) {
            bail!(
                "Invalid JWT algorithm '{}'. Must be one of: {}",
                auth.jwt_algorithm,
                valid_algorithms.join(", ")
            );
        }
        Ok(())
    }

    fn validate_rate_limits(&self) -> Result<()> {
        for value in [&self.rate_limit.default, &self.rate_limit.forecast] {
            value
                .parse::<RateLimitSpec>()
                .with_context(|| format!("Invalid rate limit '{value}'"))?;
        }
        Ok(())
    }

    fn validate_logging(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = WeatherApiConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.coordinates_ttl_seconds, 2_592_000);
        assert_eq!(config.cache.weather_ttl_seconds, 900);
        assert_eq!(config.rate_limit.forecast, "30/minute");
        assert!(!config.auth.api_key_enabled);
        assert!(!config.auth.jwt_enabled);
        assert!(config.cache.redis_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = WeatherApiConfig::default();
        config.logging.level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_invalid_rate_limit() {
        let mut config = WeatherApiConfig::default();
        config.rate_limit.forecast = "lots".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid rate limit"));
    }

    #[test]
    fn test_jwt_requires_secret() {
        let mut config = WeatherApiConfig::default();
        config.auth.jwt_enabled = true;
        config.auth.jwt_secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        let mut config = WeatherApiConfig::default();
        config.auth.jwt_algorithm = "RS256".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid JWT algorithm"));
    }

    #[test]
    fn test_user_table_parsing() {
        let mut config = WeatherApiConfig::default();
        config.auth.users = vec![
            " alice : $2b$12$abc ".to_string(),
            "bob:$2b$12$def".to_string(),
        ];
        let users = config.auth.user_table();
        assert_eq!(users.len(), 2);
        assert_eq!(users["alice"], "$2b$12$abc");
        assert_eq!(users["bob"], "$2b$12$def");
    }

    #[test]
    fn test_malformed_user_entry() {
        let mut config = WeatherApiConfig::default();
        config.auth.users = vec!["no-separator".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cache]
backend = "local"
weather_ttl_seconds = 60

[auth]
api_key_enabled = true
api_keys = ["key-1", "key-2"]

[rate_limit]
partition = "address"
"#
        )
        .unwrap();

        // The temp file has no .toml extension, so the format is forced
        let config = WeatherApiConfig::load_from_path(Some(file.path())).unwrap();
        assert_eq!(config.cache.backend, CacheBackendKind::Local);
        assert_eq!(config.cache.weather_ttl_seconds, 60);
        assert_eq!(config.cache.coordinates_ttl_seconds, 2_592_000);
        assert!(config.auth.api_key_enabled);
        assert_eq!(config.auth.api_key_set().count(), 2);
        assert_eq!(config.rate_limit.partition, RateLimitPartition::Address);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = WeatherApiConfig::load_from_path(Some(Path::new("/nonexistent/weather.toml")));
        assert!(result.is_err());
    }
}
