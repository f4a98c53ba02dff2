use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MIN_QUEUE_SIZE: usize = 5;
pub const DEFAULT_MIN_WORKERS: usize = 5;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MIN_BATCH_SIZE: usize = 1;
pub const DEFAULT_MAX_BATCH_WAIT: Duration = Duration::from_millis(10);

/// Tuning knobs for the ingestion pipeline.
///
/// Values come straight from configuration; call [`IngestConfig::normalized`]
/// before use to apply the fallbacks for out-of-range settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub queue_size: usize,
    pub max_workers: usize,
    pub default_ttl: Duration,
    pub payload_max_size: usize,
    pub metadata_max_size: usize,
    pub max_insert_workers: usize,
    pub max_batch_size: usize,
    pub max_batch_wait: Duration,
    /// Zero follows `queue_size`
    pub prune_queue_size: usize,
    /// Maximum stored State records per device; zero disables pruning
    pub state_limit_per_device: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_MIN_QUEUE_SIZE,
            max_workers: DEFAULT_MIN_WORKERS,
            default_ttl: DEFAULT_TTL,
            payload_max_size: 9 * 1024,
            metadata_max_size: 1024,
            max_insert_workers: DEFAULT_MIN_WORKERS,
            max_batch_size: DEFAULT_MIN_BATCH_SIZE,
            max_batch_wait: DEFAULT_MAX_BATCH_WAIT,
            prune_queue_size: 0,
            state_limit_per_device: 0,
        }
    }
}

impl IngestConfig {
    pub fn normalized(mut self) -> Self {
        if self.queue_size < DEFAULT_MIN_QUEUE_SIZE {
            warn!(
                configured = self.queue_size,
                fallback = DEFAULT_MIN_QUEUE_SIZE,
                "queue size too small, using fallback"
            );
            self.queue_size = DEFAULT_MIN_QUEUE_SIZE;
        }
        if self.max_workers < DEFAULT_MIN_WORKERS {
            warn!(
                configured = self.max_workers,
                fallback = DEFAULT_MIN_WORKERS,
                "max workers too small, using fallback"
            );
            self.max_workers = DEFAULT_MIN_WORKERS;
        }
        if self.default_ttl.is_zero() {
            self.default_ttl = DEFAULT_TTL;
        }
        if self.max_insert_workers < DEFAULT_MIN_WORKERS {
            warn!(
                configured = self.max_insert_workers,
                fallback = DEFAULT_MIN_WORKERS,
                "max insert workers too small, using fallback"
            );
            self.max_insert_workers = DEFAULT_MIN_WORKERS;
        }
        if self.max_batch_size < DEFAULT_MIN_BATCH_SIZE {
            self.max_batch_size = DEFAULT_MIN_BATCH_SIZE;
        }
        if self.max_batch_wait.is_zero() {
            self.max_batch_wait = DEFAULT_MAX_BATCH_WAIT;
        }
        if self.prune_queue_size == 0 {
            self.prune_queue_size = self.queue_size;
        }
        self
    }

    pub fn pruning_enabled(&self) -> bool {
        self.state_limit_per_device > 0
    }
}
