//! Service metrics as OpenTelemetry instruments.
//!
//! Instruments come from the global meter provider. Until telemetry is
//! initialised (and in tests) they are no-ops.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

use crate::error::Upstream;

/// Label used for the city of forecasts that did not succeed
const UNRESOLVED_CITY: &str = "unresolved";

const LATENCY_BUCKETS: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

struct Instruments {
    external_requests: Counter<u64>,
    external_latency: Histogram<f64>,
    forecast_requests: Counter<u64>,
    cache_lookups: Counter<u64>,
    http_requests: Counter<u64>,
    http_latency: Histogram<f64>,
    http_in_progress: UpDownCounter<i64>,
}

impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            external_requests: meter
                .u64_counter("weather_api_external_requests_total")
                .with_description("Total external API requests")
                .build(),
            external_latency: meter
                .f64_histogram("weather_api_external_request_duration_seconds")
                .with_description("External API request latency in seconds")
                .with_unit("s")
                .with_boundaries(LATENCY_BUCKETS.to_vec())
                .build(),
            forecast_requests: meter
                .u64_counter("weather_api_forecast_requests_total")
                .with_description("Total forecast requests by city")
                .build(),
            cache_lookups: meter
                .u64_counter("weather_api_cache_lookups_total")
                .with_description("Cache lookups by key family and result")
                .build(),
            http_requests: meter
                .u64_counter("weather_api_http_requests_total")
                .with_description("Total HTTP requests by route and status class")
                .build(),
            http_latency: meter
                .f64_histogram("weather_api_http_request_duration_seconds")
                .with_description("HTTP request latency in seconds")
                .with_unit("s")
                .with_boundaries(LATENCY_BUCKETS.to_vec())
                .build(),
            http_in_progress: meter
                .i64_up_down_counter("weather_api_http_requests_inprogress")
                .with_description("HTTP requests currently being handled")
                .build(),
        }
    }
}

static INSTRUMENTS: LazyLock<Instruments> =
    LazyLock::new(|| Instruments::new(&global::meter("weather-api")));

/// One upstream call: `status` is the HTTP status code or `network_error`
pub fn record_external_request(api: Upstream, status: &str, elapsed: Duration) {
    let instruments = &*INSTRUMENTS;
    instruments.external_requests.add(
        1,
        &[
            KeyValue::new("api", api.label()),
            KeyValue::new("status", status.to_string()),
        ],
    );
    instruments
        .external_latency
        .record(elapsed.as_secs_f64(), &[KeyValue::new("api", api.label())]);
}

/// City label for a forecast outcome. Only successful lookups carry the
/// normalized city, so arbitrary input cannot mint new label values.
fn city_label(city: &str, status: &str) -> String {
    if status == "success" {
        city.trim().to_lowercase()
    } else {
        UNRESOLVED_CITY.to_string()
    }
}

/// One forecast request outcome
pub fn record_forecast(city: &str, status: &'static str) {
    INSTRUMENTS.forecast_requests.add(
        1,
        &[
            KeyValue::new("city_normalized", city_label(city, status)),
            KeyValue::new("status", status),
        ],
    );
}

/// One cache lookup: `result` is `hit`, `miss` or `error`
pub fn record_cache_lookup(family: &str, result: &'static str) {
    INSTRUMENTS.cache_lookups.add(
        1,
        &[
            KeyValue::new("family", family.to_string()),
            KeyValue::new("result", result),
        ],
    );
}

/// `200` -> `2xx`
fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// An HTTP request being handled. Counted as in progress until dropped;
/// [`InFlightRequest::finish`] also records its status and latency.
pub struct InFlightRequest<'a> {
    instruments: &'a Instruments,
    method: String,
    route: String,
    started: Instant,
}

/// Start tracking a request on a templated route such as `/forecast/{city}`
pub fn http_request_started(method: &str, route: &str) -> InFlightRequest<'static> {
    InFlightRequest::start(&INSTRUMENTS, method, route)
}

impl<'a> InFlightRequest<'a> {
    fn start(instruments: &'a Instruments, method: &str, route: &str) -> Self {
        let request = Self {
            instruments,
            method: method.to_string(),
            route: route.to_string(),
            started: Instant::now(),
        };
        request
            .instruments
            .http_in_progress
            .add(1, &request.base_labels());
        request
    }

    fn base_labels(&self) -> [KeyValue; 2] {
        [
            KeyValue::new("method", self.method.clone()),
            KeyValue::new("route", self.route.clone()),
        ]
    }

    /// Record the response status and elapsed time
    pub fn finish(self, status: u16) {
        let [method, route] = self.base_labels();
        self.instruments.http_requests.add(
            1,
            &[
                method.clone(),
                route.clone(),
                KeyValue::new("status", status_class(status)),
            ],
        );
        self.instruments
            .http_latency
            .record(self.started.elapsed().as_secs_f64(), &[method, route]);
    }
}

impl Drop for InFlightRequest<'_> {
    fn drop(&mut self) {
        self.instruments
            .http_in_progress
            .add(-1, &self.base_labels());
    }
}
