use crate::pipeline::Measures;
use anyhow::Result;
use common::domain::{RecordType, RetentionStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

/// Keeps each device's stored State history at or below `state_limit`.
///
/// Works off device ID hints sent after successful inserts, so the cap can be
/// exceeded briefly between an insert and the matching prune.
pub struct Pruner {
    device_ids: mpsc::Receiver<String>,
    store: Arc<dyn RetentionStore>,
    measures: Arc<dyn Measures>,
    state_limit: usize,
}

impl Pruner {
    pub fn new(
        device_ids: mpsc::Receiver<String>,
        store: Arc<dyn RetentionStore>,
        measures: Arc<dyn Measures>,
        state_limit: usize,
    ) -> Self {
        Self {
            device_ids,
            store,
            measures,
            state_limit,
        }
    }

    /// Prune until the hint channel closes
    pub async fn run(mut self) -> Result<()> {
        debug!(state_limit = self.state_limit, "starting pruner");
        while let Some(device_id) = self.device_ids.recv().await {
            self.prune_device(&device_id).await;
        }
        debug!("pruner stopped");
        Ok(())
    }

    #[instrument(skip(self), fields(state_limit = self.state_limit))]
    async fn prune_device(&self, device_id: &str) {
        let count = match self.store.count_records(device_id, RecordType::State).await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "failed to count device records");
                return;
            }
        };
        if count <= self.state_limit {
            return;
        }

        match self
            .store
            .delete_oldest(device_id, RecordType::State, self.state_limit)
            .await
        {
            Ok(deleted) => {
                debug!(count, deleted, "pruned device history");
                self.measures.pruned(deleted as u64);
            }
            Err(e) => error!(error = %e, "failed to prune device records"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MockMeasures;
    use chrono::{Duration, TimeZone, Utc};
    use common::domain::{MockRetentionStore, Record, RecordInserter};
    use common::InMemoryRecordStore;

    fn state_record(device_id: &str, offset_secs: i64) -> Record {
        let birth = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_secs);
        Record {
            record_type: RecordType::State,
            device_id: device_id.to_string(),
            birth_date: birth,
            death_date: birth + Duration::days(1),
            data: offset_secs.to_string().into_bytes(),
            nonce: Vec::new(),
            alg: "none".to_string(),
            kid: "none".to_string(),
        }
    }

    #[tokio::test]
    async fn test_prunes_oldest_state_records_over_limit() {
        // Arrange
        let store = InMemoryRecordStore::new();
        let records: Vec<_> = [40, 10, 50, 20, 30]
            .into_iter()
            .map(|offset| state_record("mac:112233", offset))
            .collect();
        store.insert_records(&records).await.unwrap();

        let mut measures = MockMeasures::new();
        measures
            .expect_pruned()
            .withf(|count| *count == 3)
            .times(1)
            .return_const(());

        let (tx, rx) = mpsc::channel(4);
        let pruner = Pruner::new(rx, Arc::new(store.clone()), Arc::new(measures), 2);

        // Act
        tx.send("mac:112233".to_string()).await.unwrap();
        drop(tx);
        pruner.run().await.unwrap();

        // Assert
        let remaining: Vec<_> = store
            .records_for("mac:112233")
            .await
            .into_iter()
            .map(|r| String::from_utf8(r.data).unwrap())
            .collect();
        assert_eq!(remaining, vec!["40", "50"]);
    }

    #[tokio::test]
    async fn test_under_limit_skips_delete() {
        let mut store = MockRetentionStore::new();
        store
            .expect_count_records()
            .times(1)
            .returning(|_, _| Ok(2));
        store.expect_delete_oldest().times(0);
        let mut measures = MockMeasures::new();
        measures.expect_pruned().times(0);

        let (tx, rx) = mpsc::channel(1);
        let pruner = Pruner::new(rx, Arc::new(store), Arc::new(measures), 2);
        tx.send("dev".to_string()).await.unwrap();
        drop(tx);

        pruner.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_errors_do_not_stop_pruner() {
        // Arrange
        let mut store = MockRetentionStore::new();
        store
            .expect_count_records()
            .withf(|device_id: &str, _| device_id == "broken")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("timeout").into()));
        store
            .expect_count_records()
            .withf(|device_id: &str, _| device_id == "healthy")
            .times(1)
            .returning(|_, _| Ok(4));
        store
            .expect_delete_oldest()
            .withf(|device_id: &str, record_type, keep| {
                device_id == "healthy" && *record_type == RecordType::State && *keep == 1
            })
            .times(1)
            .returning(|_, _, _| Ok(3));
        let mut measures = MockMeasures::new();
        measures.expect_pruned().times(1).return_const(());

        let (tx, rx) = mpsc::channel(4);
        let pruner = Pruner::new(rx, Arc::new(store), Arc::new(measures), 1);

        // Act
        tx.send("broken".to_string()).await.unwrap();
        tx.send("healthy".to_string()).await.unwrap();
        drop(tx);

        // Assert
        pruner.run().await.unwrap();
    }
}
