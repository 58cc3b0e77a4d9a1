//! Sets up logs, spans and metrics for indexsync.
//!
//! Batch flushes are reported as log events on stdout, as spans and through
//! the meter returned by [`meter`]. Nothing leaves the process over OTLP until
//! `OTEL_SDK_DISABLED=false` opts in, so a dry run never needs a collector.
use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

const EXPORT_SWITCH_VAR: &str = "OTEL_SDK_DISABLED";
const LOG_FORMAT_VAR: &str = "RUST_LOG_FORMAT";
const FLUSH_METRICS_EVERY: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build OTLP exporter"))]
    Exporter { source: ExporterBuildError },
}

/// Where log lines and telemetry go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryConfig {
    /// Ship spans and metrics to the OTLP collector.
    pub export: bool,
    /// One JSON object per log line instead of compact text.
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(EXPORT_SWITCH_VAR).ok().as_deref(),
            std::env::var(LOG_FORMAT_VAR).ok().as_deref(),
        )
    }

    fn from_vars(export_switch: Option<&str>, log_format: Option<&str>) -> Self {
        Self {
            export: export_switch == Some("false"),
            json_logs: log_format == Some("json"),
        }
    }
}

/// Meter for the instruments of component `name`.
///
/// Instruments created before [`init_observability`] record nothing.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global subscriber, configured from the environment.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), ObservabilityError> {
    let config = TelemetryConfig::from_env();
    let scope = InstrumentationScope::builder(package_name.into())
        .with_version(package_version.into())
        .build();

    let layers = vec![console_layer(config), telemetry_layer(scope, config)?];
    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"))
}

fn console_layer<S>(config: TelemetryConfig) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer();

    if config.json_logs {
        return layer
            .with_ansi(false)
            .json()
            .with_filter(log_filter())
            .boxed();
    }

    layer
        .with_target(false)
        .compact()
        .with_filter(log_filter())
        .boxed()
}

/// Bridges spans and metric events to OpenTelemetry.
///
/// Without export the providers are still installed but keep everything local.
fn telemetry_layer<S>(
    scope: InstrumentationScope,
    config: TelemetryConfig,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let resource = Resource::builder().build();
    let mut tracers = SdkTracerProvider::builder().with_resource(resource.clone());
    let mut meters = SdkMeterProvider::builder().with_resource(resource);

    if config.export {
        let spans = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;
        let metrics = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;
        let reader = PeriodicReader::builder(metrics)
            .with_interval(FLUSH_METRICS_EVERY)
            .build();

        tracers = tracers.with_batch_exporter(spans);
        meters = meters.with_reader(reader);
    }

    let tracer = tracers.build().tracer_with_scope(scope);
    let meters = meters.build();
    global::set_meter_provider(meters.clone());

    Ok(log_filter()
        .and_then(MetricsLayer::new(meters))
        .and_then(tracing_opentelemetry::layer().with_tracer(tracer))
        .boxed())
}
