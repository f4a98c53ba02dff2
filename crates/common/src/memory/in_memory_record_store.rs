use crate::domain::{
    DomainError, DomainResult, Record, RecordInserter, RecordType, RetentionStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory record store keyed by device ID.
///
/// Implements both the insert and retention sides, which makes it the default
/// backend for the all-in-one binary and for pipeline tests.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<String, Vec<Record>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records stored for a device, oldest birth date first
    pub async fn records_for(&self, device_id: &str) -> Vec<Record> {
        let records = self.records.read().await;
        let mut found = records.get(device_id).cloned().unwrap_or_default();
        found.sort_by_key(|r| r.birth_date);
        found
    }

    pub async fn total_records(&self) -> usize {
        let records = self.records.read().await;
        records.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl RecordInserter for InMemoryRecordStore {
    async fn insert_records(&self, batch: &[Record]) -> DomainResult<()> {
        if let Some(bad) = batch.iter().find(|r| r.device_id.is_empty()) {
            return Err(DomainError::InvalidDeviceId(format!(
                "record born at {} has no device ID",
                bad.birth_date
            )));
        }

        let mut records = self.records.write().await;
        for record in batch {
            records
                .entry(record.device_id.clone())
                .or_default()
                .push(record.clone());
        }

        debug!(count = batch.len(), "stored record batch in memory");
        Ok(())
    }
}

#[async_trait]
impl RetentionStore for InMemoryRecordStore {
    async fn count_records(
        &self,
        device_id: &str,
        record_type: RecordType,
    ) -> DomainResult<usize> {
        let records = self.records.read().await;
        Ok(records
            .get(device_id)
            .map(|list| list.iter().filter(|r| r.record_type == record_type).count())
            .unwrap_or(0))
    }

    async fn delete_oldest(
        &self,
        device_id: &str,
        record_type: RecordType,
        keep_count: usize,
    ) -> DomainResult<usize> {
        let mut records = self.records.write().await;
        let Some(list) = records.get_mut(device_id) else {
            return Ok(0);
        };

        let mut matching: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, r)| r.record_type == record_type)
            .map(|(idx, _)| idx)
            .collect();
        if matching.len() <= keep_count {
            return Ok(0);
        }

        // Oldest first, so the excess sits at the front
        matching.sort_by_key(|&idx| list[idx].birth_date);
        let excess = matching.len() - keep_count;
        let mut doomed: Vec<usize> = matching.into_iter().take(excess).collect();
        doomed.sort_unstable();

        let mut idx = 0;
        list.retain(|_| {
            let keep = doomed.binary_search(&idx).is_err();
            idx += 1;
            keep
        });

        Ok(excess)
    }
}
