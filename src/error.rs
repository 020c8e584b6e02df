//! Error types and handling for the weather API
//!
//! Each layer owns a small error enum. [`ApiError`] is the only place where a
//! failure is translated into an HTTP status and a `{"detail": ...}` body.

use std::fmt;
use std::time::Duration;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// The two upstream services this API depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Geocoding,
    Weather,
}

impl Upstream {
    /// Label used in metrics and span attributes
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Upstream::Geocoding => "geocoding",
            Upstream::Weather => "weather",
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Geocoding => f.write_str("Geocoding"),
            Upstream::Weather => f.write_str("Weather"),
        }
    }
}

/// Failure talking to an upstream service
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Upstream was reachable but answered with a non-2xx status
    #[error("{service} API error: {status}")]
    Status { service: Upstream, status: u16 },

    /// Upstream could not be reached (timeout, connection refused, ...)
    #[error("{service} request failed: {message}")]
    Network { service: Upstream, message: String },

    /// Upstream answered 2xx with a body we could not understand
    #[error("{service} API returned an invalid response: {message}")]
    InvalidResponse { service: Upstream, message: String },
}

impl UpstreamError {
    pub fn status(service: Upstream, status: u16) -> Self {
        Self::Status { service, status }
    }

    pub fn network<S: Into<String>>(service: Upstream, message: S) -> Self {
        Self::Network {
            service,
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(service: Upstream, message: S) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Which upstream failed
    #[must_use]
    pub fn service(&self) -> Upstream {
        match self {
            Self::Status { service, .. }
            | Self::Network { service, .. }
            | Self::InvalidResponse { service, .. } => *service,
        }
    }
}

/// Outcome of the geocode -> weather pipeline when it does not succeed
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Geocoding answered but had no result for the city
    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Authentication failures, carrying the client-facing message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable credential (401)
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Credential present but not accepted (403)
    #[error("{0}")]
    Forbidden(&'static str),
}

impl AuthError {
    pub const TOKEN_EXPIRED: AuthError = AuthError::Unauthenticated("token expired");
    pub const INVALID_TOKEN: AuthError = AuthError::Unauthenticated("invalid token");
    pub const MISSING: AuthError = AuthError::Unauthenticated("missing authentication");
    pub const INVALID_API_KEY: AuthError = AuthError::Forbidden("invalid api key");

    /// Client-facing message
    #[must_use]
    pub fn detail(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(detail) | AuthError::Forbidden(detail) => detail,
        }
    }
}

/// Quota exhausted for the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded: {limit}")]
pub struct RateLimited {
    /// Human readable form of the quota, e.g. `30 per 1 minute`
    pub limit: String,
    /// How long until the caller may try again
    pub retry_after: Duration,
}

/// Every failure that can end a request, mapped to exactly one HTTP status
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// Login attempted with an unknown user or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Login attempted while token authentication is switched off
    #[error("token authentication not enabled")]
    TokenAuthDisabled,

    /// The request could not be parsed (bad JSON body, undecodable path)
    #[error("{detail}")]
    InvalidRequest { status: StatusCode, detail: String },

    /// Something on our side broke (e.g. token signing)
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    /// HTTP status for this failure
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forecast(ForecastError::CityNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Forecast(ForecastError::Upstream(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Auth(AuthError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::TokenAuthDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidRequest { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human readable message returned to the client
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            ApiError::Auth(err) => err.detail().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidRequest {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let mut response = (status, Json(json!({ "detail": self.detail() }))).into_response();

        if let ApiError::RateLimited(limited) = &self {
            let seconds = limited.retry_after.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
