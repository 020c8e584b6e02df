//! HTTP routes
//!
//! `GET /forecast/{city}` runs authentication, then the forecast rate limit,
//! then the pipeline. `POST /auth/login` exchanges a username and password for
//! a bearer token. `GET /health` is always open.

pub mod middleware;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, State},
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::auth::{API_KEY_HEADER, AuthGate, Credentials, Identity, UserStore};
use crate::cache::CacheStore;
use crate::config::WeatherApiConfig;
use crate::error::ApiError;
use crate::forecast::ForecastPipeline;
use crate::models::ForecastResult;
use crate::rate_limit::{RateLimiter, Route};

pub use middleware::ClientAddr;

/// Everything a handler needs, shared across requests
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ForecastPipeline>,
    pub auth: AuthGate,
    pub limiter: RateLimiter,
    pub users: UserStore,
}

impl AppState {
    #[must_use]
    pub fn new(pipeline: ForecastPipeline, auth: AuthGate, limiter: RateLimiter, users: UserStore) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            auth,
            limiter,
            users,
        }
    }

    /// Wire up all components around an already connected cache
    pub fn from_config(config: &WeatherApiConfig, cache: CacheStore) -> Result<Self> {
        Ok(Self::new(
            ForecastPipeline::from_config(config, cache)?,
            AuthGate::from_config(&config.auth)?,
            RateLimiter::from_config(&config.rate_limit)?,
            UserStore::new(config.auth.user_table()),
        ))
    }
}

/// `Json` whose rejections go through [`ApiError`]
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejections go through [`ApiError`]
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/forecast/{city}", get(get_forecast))
        .route("/auth/login", post(login))
        .route("/health", get(health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(axum::middleware::from_fn(middleware::log_requests)),
        )
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn credentials(headers: &HeaderMap) -> Credentials<'_> {
    Credentials {
        bearer: bearer_token(headers),
        api_key: headers.get(API_KEY_HEADER).and_then(|value| value.to_str().ok()),
    }
}

async fn get_forecast(
    State(state): State<AppState>,
    ClientAddr(client_addr): ClientAddr,
    ApiPath(city): ApiPath<String>,
    headers: HeaderMap,
) -> Result<Json<ForecastResult>, ApiError> {
    let identity = state.auth.authenticate(credentials(&headers))?;
    state.limiter.check(Route::Forecast, &identity, &client_addr)?;

    tracing::debug!(city = %city, identity = %identity.log_label(), "forecast requested");
    let forecast = state.pipeline.get_forecast(&city).await?;
    Ok(Json(forecast))
}

async fn login(
    State(state): State<AppState>,
    ClientAddr(client_addr): ClientAddr,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    state
        .limiter
        .check(Route::Default, &Identity::Anonymous, &client_addr)?;

    let Some(tokens) = state.auth.tokens() else {
        return Err(ApiError::TokenAuthDisabled);
    };

    if !state.users.verify(&request.username, &request.password).await {
        tracing::info!(username = %request.username, "login rejected");
        return Err(ApiError::InvalidCredentials);
    }

    let access_token = tokens.issue(&request.username).map_err(ApiError::Internal)?;
    tracing::info!(username = %request.username, "token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
