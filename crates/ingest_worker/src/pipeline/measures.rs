use crate::domain::DropReason;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

pub const DROPPED_EVENTS_TOTAL: &str = "dropped_events_total";
pub const RECORDS_INSERTED_TOTAL: &str = "records_inserted_total";
pub const INSERT_BATCHES_TOTAL: &str = "insert_batches_total";
pub const PRUNED_RECORDS_TOTAL: &str = "pruned_records_total";
pub const PROCESSING_DURATION_SECONDS: &str = "ingest_processing_duration_seconds";

const REASON_LABEL: &str = "reason";

/// Sink for pipeline counters
#[cfg_attr(test, mockall::automock)]
pub trait Measures: Send + Sync {
    fn dropped(&self, reason: DropReason, count: u64);
    fn inserted(&self, count: u64);
    fn batch_flushed(&self);
    fn pruned(&self, count: u64);
    /// Time from admission to the record's terminal state
    fn processing_time(&self, elapsed: Duration);
}

/// [`Measures`] backed by the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMeasures;

impl MetricsMeasures {
    /// Register descriptions with the installed recorder. Safe to call more than once.
    pub fn describe() {
        describe_counter!(
            DROPPED_EVENTS_TOTAL,
            Unit::Count,
            "Records dropped before reaching storage, by reason"
        );
        describe_counter!(
            RECORDS_INSERTED_TOTAL,
            Unit::Count,
            "Records written by successful batch inserts"
        );
        describe_counter!(
            INSERT_BATCHES_TOTAL,
            Unit::Count,
            "Batch insert calls that succeeded"
        );
        describe_counter!(
            PRUNED_RECORDS_TOTAL,
            Unit::Count,
            "State records deleted by retention pruning"
        );
        describe_histogram!(
            PROCESSING_DURATION_SECONDS,
            Unit::Seconds,
            "Time from admission to insert or drop"
        );
    }
}

impl Measures for MetricsMeasures {
    fn dropped(&self, reason: DropReason, count: u64) {
        counter!(DROPPED_EVENTS_TOTAL, REASON_LABEL => reason.as_str()).increment(count);
    }

    fn inserted(&self, count: u64) {
        counter!(RECORDS_INSERTED_TOTAL).increment(count);
    }

    fn batch_flushed(&self) {
        counter!(INSERT_BATCHES_TOTAL).increment(1);
    }

    fn pruned(&self, count: u64) {
        counter!(PRUNED_RECORDS_TOTAL).increment(count);
    }

    fn processing_time(&self, elapsed: Duration) {
        histogram!(PROCESSING_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}
