//! # Telemetry
//!
//! Log output is always on and goes to stderr through
//! `tracing_subscriber::fmt`, either human-readable (`--log-format pretty`) or
//! one JSON object per line (`--log-format json`). The filter is read from
//! `RUST_LOG` and defaults to `info`.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables scan logging and OpenTelemetry spans.
//! - `metrics`: Enables OpenTelemetry scan metrics.
//! - `stdout`: Exports spans and metrics with the OpenTelemetry stdout
//!   exporter.
//!
//! ## Metrics
//!
//! | Name               | Kind      | Meaning                          |
//! | ------------------ | --------- | -------------------------------- |
//! | `scans`            | counter   | Scans started                    |
//! | `pages`            | counter   | Pages received from the store    |
//! | `items_scanned`    | counter   | Items received from the store    |
//! | `segment_failures` | counter   | Segments that did not complete   |
//! | `scan_duration`    | histogram | End-to-end scan duration, in ms  |
//!
//! Without the `metrics` feature the `record_*`/`increment_*` helpers compile
//! to no-ops.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p segscan-cli --features tracing,metrics,stdout -- --parallelism 8
//! ```

// Disallow using `stdout` without `tracing` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use crate::config::LogFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

pub fn init_telemetry(log_format: LogFormat) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder("segscan")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    // Console output via `tracing_subscriber::fmt`. This is unrelated to the
    // `opentelemetry_stdout` exporter. Logs go to stderr so stdout only
    // carries scan output.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_file(true);
    match log_format {
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).init(),
        LogFormat::Json => registry.with(fmt_layer.json().flatten_event(true)).init(),
    }

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

impl TelemetryProviders {
    /// Flushes and shuts down every provider. Errors go to stderr since the
    /// subscriber may already be unusable at this point.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {:#?}", err);
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {:#?}", err);
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {:#?}", err);
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {:#?}", err);
            }
        }
    }
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("segscan")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    Ok(builder.build())
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static SCANS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static PAGES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ITEMS_SCANNED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SEGMENT_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SCAN_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = SCANS.set(
        meter
            .u64_counter("scans")
            .with_description("Parallel scans started")
            .build(),
    );

    let _ = PAGES.set(
        meter
            .u64_counter("pages")
            .with_description("Pages received from the store")
            .build(),
    );

    let _ = ITEMS_SCANNED.set(
        meter
            .u64_counter("items_scanned")
            .with_description("Items received from the store")
            .build(),
    );

    let _ = SEGMENT_FAILURES.set(
        meter
            .u64_counter("segment_failures")
            .with_description("Segments that failed, were cancelled or timed out")
            .build(),
    );

    let _ = SCAN_DURATION_MS.set(
        meter
            .f64_histogram("scan_duration")
            .with_unit("ms")
            .with_description("End-to-end scan duration")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_scans() {
    if let Some(counter) = SCANS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_scans() {}

#[cfg(feature = "metrics")]
pub fn increment_pages(items: u64) {
    if let Some(counter) = PAGES.get() {
        counter.add(1, &[]);
    }
    if let Some(counter) = ITEMS_SCANNED.get() {
        counter.add(items, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_pages(_items: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_segment_failures(reason: &'static str) {
    if let Some(counter) = SEGMENT_FAILURES.get() {
        counter.add(1, &[KeyValue::new("reason", reason)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_segment_failures(_reason: &'static str) {}

#[cfg(feature = "metrics")]
pub fn record_scan_duration(duration_ms: f64) {
    if let Some(histogram) = SCAN_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_scan_duration(_duration_ms: f64) {}
