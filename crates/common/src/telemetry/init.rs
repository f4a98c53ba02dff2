use anyhow::{Context, Result};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::{
    logs::LoggerProvider,
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{TelemetryConfig, TelemetryProviders};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. With OTEL enabled, spans and log
/// events are additionally exported over OTLP/gRPC and the returned providers
/// must be passed to [`shutdown_telemetry`] to flush them.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<Option<TelemetryProviders>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let providers = if config.otel_enabled {
        Some(build_providers(config)?)
    } else {
        None
    };

    let otel_trace_layer = providers.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer_provider.tracer("vigil"))
    });
    let otel_log_layer = providers
        .as_ref()
        .map(|p| OpenTelemetryTracingBridge::new(&p.logger_provider));

    let json_layer = config.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(true)
            .with_current_span(true)
    });
    let pretty_layer = (!config.json_logs).then(|| tracing_subscriber::fmt::layer().with_target(true));

    // OTel trace layer before the log bridge so events can see the span context
    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_trace_layer)
        .with(otel_log_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(providers)
}

fn build_providers(config: &TelemetryConfig) -> Result<TelemetryProviders> {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name.clone(),
    )]);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let log_exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP log exporter")?;

    let logger_provider = LoggerProvider::builder()
        .with_batch_exporter(log_exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    Ok(TelemetryProviders {
        tracer_provider,
        logger_provider,
    })
}

/// Flush and stop exporters created by [`init_telemetry`]
pub fn shutdown_telemetry(providers: Option<TelemetryProviders>) {
    let Some(providers) = providers else {
        return;
    };
    if let Err(e) = providers.tracer_provider.shutdown() {
        eprintln!("error shutting down tracer provider: {:?}", e);
    }
    if let Err(e) = providers.logger_provider.shutdown() {
        eprintln!("error shutting down logger provider: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "vigil");
        assert_eq!(config.otel_endpoint, "http://localhost:4317");
        assert!(!config.otel_enabled);
        assert!(config.json_logs);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_shutdown_without_providers_is_noop() {
        shutdown_telemetry(None);
    }
}
