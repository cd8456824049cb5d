//! Telemetry for Tollgate
//!
//! Structured logging through `tracing-subscriber`, OTLP trace and metric
//! export, and the [`MetricsSink`] the gateway reports into. [`OtelMetrics`]
//! records against the global meter, so gateway metrics reach the collector
//! once [`init`] has installed a meter provider.

mod metadata;
pub mod metrics;

use std::time::Duration;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tollgate_config::TelemetryConfig;
use tollgate_config::telemetry::{ExportProtocol, ExporterConfig, TracingConfig};

pub use metrics::{MetricsSink, NoopMetrics, OtelMetrics, RequestMetrics};

/// Metric export interval when the exporter sets no batch delay
const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the OTLP providers; flushes and shuts them down when dropped
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Build a provider for each exporter `config` resolves, without
    /// installing anything globally
    ///
    /// Spans and metrics are independent: a config with only a tracing
    /// exporter yields a tracer provider and no meter provider. A gRPC
    /// exporter must be built inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if an OTLP exporter cannot be built
    pub fn from_config(config: Option<&TelemetryConfig>) -> anyhow::Result<Self> {
        let Some(config) = config else {
            return Ok(Self {
                meter_provider: None,
                tracer_provider: None,
            });
        };
        let resource = metadata::build_resource(config);

        let meter_provider = config
            .metrics_exporter()
            .map(|exporter| meter_provider(exporter, resource.clone()))
            .transpose()?;
        let tracer_provider = config
            .tracing_exporter()
            .map(|exporter| tracer_provider(exporter, config.tracing.as_ref(), resource))
            .transpose()?;

        Ok(Self {
            meter_provider,
            tracer_provider,
        })
    }

    #[must_use]
    pub const fn exports_metrics(&self) -> bool {
        self.meter_provider.is_some()
    }

    #[must_use]
    pub const fn exports_traces(&self) -> bool {
        self.tracer_provider.is_some()
    }

    /// Export pending spans and metrics now
    ///
    /// # Errors
    ///
    /// Returns an error if either provider fails to flush
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(ref provider) = self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        if let Some(ref provider) = self.tracer_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush spans: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Install the global subscriber and whichever OTLP providers are configured
///
/// `log_filter` is an `EnvFilter` directive; an invalid one falls back to
/// `info`. Fails if a global subscriber is already installed. Hold the
/// returned guard for the lifetime of the process.
///
/// # Errors
///
/// Returns an error if an exporter cannot be built or a subscriber is
/// already installed
pub fn init(config: Option<&TelemetryConfig>, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let guard = TelemetryGuard::from_config(config)?;

    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    let otel_layer = guard
        .tracer_provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer("tollgate")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(ref provider) = guard.meter_provider {
        global::set_meter_provider(provider.clone());
    }
    if let Some(ref provider) = guard.tracer_provider {
        global::set_tracer_provider(provider.clone());
    }

    tracing::info!(
        metrics = guard.exports_metrics(),
        traces = guard.exports_traces(),
        "telemetry initialized"
    );
    Ok(guard)
}

fn meter_provider(exporter: &ExporterConfig, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter_builder = MetricExporter::builder();
    let metric_exporter = match exporter.protocol {
        ExportProtocol::Grpc => {
            warn_ignored_headers(exporter);
            exporter_builder
                .with_tonic()
                .with_endpoint(exporter.endpoint.as_str())
                .build()
        }
        ExportProtocol::HttpProto => exporter_builder
            .with_http()
            .with_endpoint(exporter.endpoint.as_str())
            .with_headers(exporter.headers.clone())
            .build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build metrics exporter for {}: {e}", exporter.endpoint))?;

    let interval = exporter
        .batch
        .as_ref()
        .map_or(DEFAULT_EXPORT_INTERVAL, |batch| Duration::from_secs(batch.scheduled_delay));
    let reader = PeriodicReader::builder(metric_exporter)
        .with_interval(interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

fn tracer_provider(
    exporter: &ExporterConfig,
    tracing: Option<&TracingConfig>,
    resource: Resource,
) -> anyhow::Result<SdkTracerProvider> {
    let exporter_builder = SpanExporter::builder();
    let span_exporter = match exporter.protocol {
        ExportProtocol::Grpc => {
            warn_ignored_headers(exporter);
            exporter_builder
                .with_tonic()
                .with_endpoint(exporter.endpoint.as_str())
                .build()
        }
        ExportProtocol::HttpProto => exporter_builder
            .with_http()
            .with_endpoint(exporter.endpoint.as_str())
            .with_headers(exporter.headers.clone())
            .build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build span exporter for {}: {e}", exporter.endpoint))?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler(tracing))
        .with_batch_exporter(span_exporter)
        .build())
}

/// Sampler for the configured rate, wrapped to honour the parent decision
/// unless `parent_based` is off
fn sampler(tracing: Option<&TracingConfig>) -> Sampler {
    let rate = tracing.map_or(1.0, |t| t.sampling_rate);
    let base = if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    };

    if tracing.is_none_or(|t| t.parent_based) {
        Sampler::ParentBased(Box::new(base))
    } else {
        base
    }
}

fn warn_ignored_headers(exporter: &ExporterConfig) {
    if !exporter.headers.is_empty() {
        tracing::warn!(endpoint = %exporter.endpoint, "exporter headers are only sent over http_proto");
    }
}
