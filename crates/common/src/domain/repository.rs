use crate::domain::record::{Record, RecordType};
use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Write side of the record store.
/// Infrastructure implements this; a successful return means the whole batch is durable.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordInserter: Send + Sync {
    /// Write every record in one operation.
    ///
    /// Failure handling: the batch fails as a whole, no partial writes are reported
    async fn insert_records(&self, records: &[Record]) -> DomainResult<()>;
}

/// Retention side of the record store, used by the pruner
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Number of stored records of `record_type` for a device
    async fn count_records(&self, device_id: &str, record_type: RecordType)
        -> DomainResult<usize>;

    /// Delete the oldest records of `record_type` for a device so that at most
    /// `keep_count` of the newest remain. Returns how many were deleted.
    async fn delete_oldest(
        &self,
        device_id: &str,
        record_type: RecordType,
        keep_count: usize,
    ) -> DomainResult<usize>;
}
