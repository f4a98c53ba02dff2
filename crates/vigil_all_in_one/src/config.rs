use anyhow::Context;
use config::{Config, ConfigError, Environment};
use ingest_worker::{IngestConfig, RuleConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human readable output
    #[serde(default = "default_true")]
    pub log_json: bool,

    // Ingestion pipeline
    /// Admission queue capacity
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Concurrent record builds
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// TTL for rules that do not set one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_payload_max_size")]
    pub payload_max_size: usize,

    #[serde(default = "default_metadata_max_size")]
    pub metadata_max_size: usize,

    /// Concurrent batch inserts
    #[serde(default = "default_max_workers")]
    pub max_insert_workers: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_batch_wait_ms")]
    pub max_batch_wait_ms: u64,

    /// Prune hint queue capacity, 0 follows queue_size
    #[serde(default)]
    pub prune_queue_size: usize,

    /// Stored State records kept per device, 0 disables pruning
    #[serde(default = "default_state_limit_per_device")]
    pub state_limit_per_device: usize,

    /// JSON array of `{"regex", "store_payload", "ttl_secs"}` objects, first match wins
    #[serde(default = "default_rules_json")]
    pub rules_json: String,

    /// Comma separated `device_id[=reason]` entries
    #[serde(default)]
    pub blacklist: String,

    // Encryption
    /// Base64 AES-256 key; payloads are stored unencrypted when unset
    #[serde(default)]
    pub encryption_key: Option<String>,

    #[serde(default = "default_encryption_kid")]
    pub encryption_kid: String,

    // Metrics
    /// Prometheus scrape listener address
    #[serde(default = "default_metrics_listen_addr")]
    pub metrics_listen_addr: String,

    // Demo producer
    #[serde(default = "default_true")]
    pub demo_producer_enabled: bool,

    #[serde(default = "default_demo_interval_ms")]
    pub demo_interval_ms: u64,

    #[serde(default = "default_demo_device_count")]
    pub demo_device_count: usize,

    // Shutdown
    /// Time allowed for the pipeline to drain after a shutdown signal
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// OpenTelemetry service name
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    /// Enable OpenTelemetry tracing
    #[serde(default)]
    pub otel_enabled: bool,
}

// The encryption key must never reach the logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("queue_size", &self.queue_size)
            .field("max_workers", &self.max_workers)
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("payload_max_size", &self.payload_max_size)
            .field("metadata_max_size", &self.metadata_max_size)
            .field("max_insert_workers", &self.max_insert_workers)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_batch_wait_ms", &self.max_batch_wait_ms)
            .field("prune_queue_size", &self.prune_queue_size)
            .field("state_limit_per_device", &self.state_limit_per_device)
            .field("rules_json", &self.rules_json)
            .field("blacklist", &self.blacklist)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("encryption_kid", &self.encryption_kid)
            .field("metrics_listen_addr", &self.metrics_listen_addr)
            .field("demo_producer_enabled", &self.demo_producer_enabled)
            .field("demo_interval_ms", &self.demo_interval_ms)
            .field("demo_device_count", &self.demo_device_count)
            .field("shutdown_timeout_secs", &self.shutdown_timeout_secs)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("otel_service_name", &self.otel_service_name)
            .field("otel_enabled", &self.otel_enabled)
            .finish()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_queue_size() -> usize {
    1000
}

fn default_max_workers() -> usize {
    10
}

fn default_ttl_secs() -> u64 {
    5 * 60
}

fn default_payload_max_size() -> usize {
    9 * 1024
}

fn default_metadata_max_size() -> usize {
    1024
}

fn default_max_batch_size() -> usize {
    50
}

fn default_max_batch_wait_ms() -> u64 {
    100
}

fn default_state_limit_per_device() -> usize {
    100
}

fn default_rules_json() -> String {
    r#"[{"regex": ".*", "store_payload": true, "ttl_secs": 3600}]"#.to_string()
}

fn default_encryption_kid() -> String {
    "default".to_string()
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_demo_interval_ms() -> u64 {
    1000
}

fn default_demo_device_count() -> usize {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "vigil".to_string()
}

impl ServiceConfig {
    /// Load configuration from environment variables prefixed with `VIGIL_`
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("VIGIL"))
            .build()?
            .try_deserialize()
    }

    /// Raw pipeline settings; the worker applies its own fallbacks
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            queue_size: self.queue_size,
            max_workers: self.max_workers,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            payload_max_size: self.payload_max_size,
            metadata_max_size: self.metadata_max_size,
            max_insert_workers: self.max_insert_workers,
            max_batch_size: self.max_batch_size,
            max_batch_wait: Duration::from_millis(self.max_batch_wait_ms),
            prune_queue_size: self.prune_queue_size,
            state_limit_per_device: self.state_limit_per_device,
        }
    }

    pub fn rule_configs(&self) -> anyhow::Result<Vec<RuleConfig>> {
        serde_json::from_str(&self.rules_json).context("failed to parse VIGIL_RULES_JSON")
    }

    /// Base64 key when encryption is configured
    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}
