//! Logging, tracing and metrics setup
//!
//! Logs always go to stdout through `tracing-subscriber` (JSON or pretty).
//! When an OTLP endpoint is configured, spans, log records and metrics are
//! also exported over OTLP/HTTP.

pub mod metrics;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LoggingConfig, TelemetryConfig};

/// Keeps exporters alive; flushes them on [`TelemetryGuard::shutdown`]
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    /// Flush and stop all exporters
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {err}");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to shut down meter provider: {err}");
            }
        }
        if let Some(provider) = self.logger_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to shut down logger provider: {err}");
            }
        }
    }
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new(SERVICE_VERSION, crate::VERSION))
        .build()
}

/// Join a collector base URL and a signal path without doubling slashes
fn signal_endpoint(base: &str, signal: &str) -> String {
    format!("{}/v1/{signal}", base.trim_end_matches('/'))
}

/// Install the global subscriber and, if configured, the OTLP exporters.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(logging: &LoggingConfig, telemetry: &TelemetryConfig) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let fmt_layer = if logging.format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt_layer];
    let mut guard = TelemetryGuard::default();

    if let Some(endpoint) = telemetry.otlp_endpoint.as_deref() {
        let resource = resource(&telemetry.service_name);

        let span_exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(signal_endpoint(endpoint, "traces"))
            .build()
            .context("Failed to build OTLP span exporter")?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();
        let tracer = tracer_provider.tracer("weather-api");
        global::set_tracer_provider(tracer_provider.clone());
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());

        let metric_exporter = MetricExporter::builder()
            .with_http()
            .with_endpoint(signal_endpoint(endpoint, "metrics"))
            .build()
            .context("Failed to build OTLP metric exporter")?;
        let meter_provider = SdkMeterProvider::builder()
            .with_periodic_exporter(metric_exporter)
            .with_resource(resource.clone())
            .build();
        global::set_meter_provider(meter_provider.clone());

        let log_exporter = LogExporter::builder()
            .with_http()
            .with_endpoint(signal_endpoint(endpoint, "logs"))
            .build()
            .context("Failed to build OTLP log exporter")?;
        let logger_provider = SdkLoggerProvider::builder()
            .with_batch_exporter(log_exporter)
            .with_resource(resource)
            .build();
        layers.push(OpenTelemetryTracingBridge::new(&logger_provider).boxed());

        guard = TelemetryGuard {
            tracer_provider: Some(tracer_provider),
            meter_provider: Some(meter_provider),
            logger_provider: Some(logger_provider),
        };
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(endpoint) = telemetry.otlp_endpoint.as_deref() {
        tracing::info!(endpoint, service = %telemetry.service_name, "OpenTelemetry export enabled");
    }

    Ok(guard)
}
