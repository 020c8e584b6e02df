use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, MatchedPath, Request};
use axum::http::Extensions;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::RequestId;
use tracing::{Instrument, info, info_span};

use crate::auth::{API_KEY_HEADER, mask_api_key};
use crate::telemetry::metrics;

/// Routes left out of the HTTP request metrics
const UNMETERED_ROUTES: [&str; 2] = ["/health", "/metrics"];

/// Peer address of the connection, or `"unknown"` when the server was not
/// started with connect info (e.g. in tests)
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

fn client_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr(client_addr(&parts.extensions)))
    }
}

/// Route template to meter the request under. Unmatched paths and the
/// health endpoints are not metered.
fn metered_route(extensions: &Extensions) -> Option<String> {
    let route = extensions.get::<MatchedPath>()?.as_str();
    (!UNMETERED_ROUTES.contains(&route)).then(|| route.to_string())
}

/// Wrap every request in a span carrying its id, log start and completion,
/// and feed the HTTP request metrics
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("-")
        .to_string();
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(mask_api_key);
    let in_flight = metered_route(request.extensions())
        .map(|route| metrics::http_request_started(request.method().as_str(), &route));

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        client_ip = %client_addr(request.extensions()),
        api_key = api_key.as_deref().unwrap_or("-"),
    );

    async move {
        info!("request_started");
        let response = next.run(request).await;
        let status = response.status().as_u16();
        if let Some(in_flight) = in_flight {
            in_flight.finish(status);
        }
        info!(
            status,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "request_completed"
        );
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    /// Router that records what `metered_route` saw for each request
    fn recording_router(seen: Arc<Mutex<Vec<Option<String>>>>) -> Router {
        Router::new()
            .route("/forecast/{city}", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(move |request: Request, next: Next| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(metered_route(request.extensions()));
                    next.run(request).await
                }
            }))
            .layer(axum::middleware::from_fn(log_requests))
    }

    async fn call(app: &Router, uri: &str) -> u16 {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap().status().as_u16()
    }

    #[tokio::test]
    async fn test_forecast_is_metered_by_template() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = recording_router(seen.clone());

        assert_eq!(call(&app, "/forecast/London").await, 200);
        assert_eq!(call(&app, "/forecast/Paris").await, 200);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Some("/forecast/{city}".to_string()),
                Some("/forecast/{city}".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_health_is_not_metered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = recording_router(seen.clone());

        assert_eq!(call(&app, "/health").await, 200);
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_unmatched_path_passes_through() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = recording_router(seen.clone());

        assert_eq!(call(&app, "/nope").await, 404);
    }
}
