use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};

/// Logging and export settings for a vigil process
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Reported as `service.name` on exported spans and logs
    pub service_name: String,
    /// OTLP gRPC collector, only dialed when `otel_enabled` is set
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// `EnvFilter` directive; `RUST_LOG` wins when present
    pub log_level: String,
    /// JSON lines on stdout when true, human readable output otherwise
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "vigil".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

/// OTLP pipelines kept alive for the life of the process.
///
/// Pass back to `shutdown_telemetry` so buffered spans and logs are flushed
/// before exit.
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}
